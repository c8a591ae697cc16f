//! peermesh hub — CRDT coordination point for browser peers.
//!
//! Peers connect over WebSocket, join one `crdt:`-prefixed topic each,
//! and exchange commands and merges against shared CRDT replicas. The
//! hub holds the replicas in a volatile in-process registry and fans
//! converged state back out to every subscriber.
//!
//! Usage:
//!   peermesh-hub --bind 127.0.0.1:9030

use anyhow::{Context, Result};
use clap::Parser;
use peermesh_channel::SessionConfig;
use peermesh_crdt::ReplicaKind;
use peermesh_hub::{build_router, HubState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "peermesh-hub")]
#[command(about = "CRDT coordination hub for browser peers")]
struct Args {
    /// Address to bind the HTTP/WebSocket listener to
    #[arg(short, long, default_value = "127.0.0.1:9030")]
    bind: String,

    /// CRDT kind assumed for keys nobody has written yet
    /// (g_counter, pn_counter, lww_register, or_set)
    #[arg(long, default_value = "g_counter")]
    default_kind: String,

    /// Keepalive window in seconds; idle sessions are closed after it
    #[arg(long, default_value = "45")]
    keepalive_secs: u64,

    /// Idempotency window in seconds for repeated request ids
    #[arg(long, default_value = "60")]
    idempotency_secs: u64,

    /// Broadcast buffer depth per subscriber
    #[arg(long, default_value = "64")]
    subscriber_capacity: usize,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let default_kind = ReplicaKind::parse(&args.default_kind)
        .with_context(|| format!("unrecognized default kind `{}`", args.default_kind))?;

    let session_config = SessionConfig {
        default_kind,
        keepalive: Duration::from_secs(args.keepalive_secs),
        idempotency_ttl: Duration::from_secs(args.idempotency_secs),
        subscriber_capacity: args.subscriber_capacity,
    };
    let state = Arc::new(HubState::new(session_config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    let addr = listener.local_addr()?;

    info!("peermesh hub listening on {addr}");
    info!("  websocket: ws://{addr}/ws?node_id=<id>");
    info!("  info:      http://{addr}/api/v1/info");
    info!("  default kind: {default_kind}");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
