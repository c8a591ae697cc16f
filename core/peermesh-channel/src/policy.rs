//! Capability policy: map a peer's capability report to a delivery
//! profile.
//!
//! Browsers differ wildly in what they can sustain; the profile decides
//! update cadence, batching, and whether the peer gets delta sync or
//! server-rendered fallbacks. Assignment is a pure function; the table
//! tracks what each node reported and received.

use peermesh_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

/// Physical connection type, as reported by the browser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connection {
    Wifi,
    Ethernet,
    Cellular,
    #[default]
    Unknown,
}

/// Effective connection speed class (Network Information API).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effective {
    #[default]
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "3g")]
    G3,
    #[serde(rename = "4g")]
    G4,
}

/// What a peer says it can do, sent once at socket open.
///
/// All fields default to the weakest value, so a peer that reports
/// nothing lands in the minimal profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityReport {
    pub has_workers: bool,
    pub has_sab: bool,
    pub has_web_transport: bool,
    pub memory_mb: u64,
    pub connection: Connection,
    pub effective: Effective,
}

/// Delivery profile assigned to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Full,
    Constrained,
    Minimal,
}

impl Profile {
    /// The wire name of this profile.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Constrained => "constrained",
            Self::Minimal => "minimal",
        }
    }

    /// The delivery parameters for this profile.
    #[must_use]
    pub fn config(&self) -> ProfileConfig {
        match self {
            Self::Full => ProfileConfig {
                update_frequency_ms: 16,
                batch_events: false,
                delta_sync: true,
                server_render: false,
                max_batch_size: 1,
            },
            Self::Constrained => ProfileConfig {
                update_frequency_ms: 100,
                batch_events: true,
                delta_sync: true,
                server_render: false,
                max_batch_size: 10,
            },
            Self::Minimal => ProfileConfig {
                update_frequency_ms: 1000,
                batch_events: true,
                delta_sync: false,
                server_render: true,
                max_batch_size: 50,
            },
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery parameters sent to the peer in the join acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub update_frequency_ms: u64,
    pub batch_events: bool,
    pub delta_sync: bool,
    pub server_render: bool,
    pub max_batch_size: usize,
}

/// Assigns a delivery profile from a capability report.
///
/// First match wins:
/// 1. `full` — workers, SharedArrayBuffer, ≥ 2 GiB, and a fast link
/// 2. `constrained` — workers and ≥ 512 MiB
/// 3. `minimal` — everything else
#[must_use]
pub fn assign_profile(report: &CapabilityReport) -> Profile {
    let fast_link = matches!(report.connection, Connection::Wifi | Connection::Ethernet)
        || report.effective == Effective::G4;
    if report.has_workers && report.has_sab && report.memory_mb >= 2048 && fast_link {
        Profile::Full
    } else if report.has_workers && report.memory_mb >= 512 {
        Profile::Constrained
    } else {
        Profile::Minimal
    }
}

/// One node's current standing with the policy.
#[derive(Debug, Clone)]
pub struct Registration {
    pub report: CapabilityReport,
    pub profile: Profile,
    pub registered_at: Instant,
}

/// In-memory table of registered peers.
///
/// Touched only on connect, capability update, and disconnect.
#[derive(Debug, Default)]
pub struct PolicyTable {
    peers: RwLock<HashMap<NodeId, Registration>>,
}

impl PolicyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node and returns its assigned profile.
    ///
    /// Re-registering behaves like [`PolicyTable::update`].
    pub async fn register(&self, node: &NodeId, report: CapabilityReport) -> Profile {
        self.update(node, report).await
    }

    /// Re-evaluates a node's profile from a fresh report.
    ///
    /// A profile change is observability-only: it is logged, not
    /// signalled through the channel.
    pub async fn update(&self, node: &NodeId, report: CapabilityReport) -> Profile {
        let profile = assign_profile(&report);
        let mut peers = self.peers.write().await;
        match peers.get_mut(node) {
            Some(existing) => {
                if existing.profile != profile {
                    info!(node = %node, from = %existing.profile, to = %profile,
                        "peer profile changed");
                }
                existing.report = report;
                existing.profile = profile;
            }
            None => {
                info!(node = %node, profile = %profile, "peer registered");
                peers.insert(
                    node.clone(),
                    Registration {
                        report,
                        profile,
                        registered_at: Instant::now(),
                    },
                );
            }
        }
        profile
    }

    /// Removes a node from the table. Idempotent.
    pub async fn unregister(&self, node: &NodeId) {
        if self.peers.write().await.remove(node).is_some() {
            info!(node = %node, "peer unregistered");
        }
    }

    /// Returns a node's registration, if present.
    pub async fn get(&self, node: &NodeId) -> Option<Registration> {
        self.peers.read().await.get(node).cloned()
    }

    /// Number of registered peers.
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// True if no peer is registered.
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
