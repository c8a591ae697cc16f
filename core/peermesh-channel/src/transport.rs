//! Transport abstraction.
//!
//! The session layer speaks to peers through a duplex, message-oriented
//! transport carrying opaque byte frames. The server binary implements
//! this over WebSocket; tests use the in-memory [`mock`] pair.
//!
//! Backpressure is surfaced, not absorbed: a send that cannot proceed
//! reports [`SendStatus::Backpressure`] and the session applies policy
//! (for this server: close the session).

use async_trait::async_trait;

/// Outcome of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The frame was accepted for delivery.
    Sent,
    /// The peer is not draining its stream; the frame was not sent.
    Backpressure,
    /// The transport is closed.
    Closed,
}

/// Outcome of a receive attempt.
#[derive(Debug)]
pub enum Inbound {
    /// One complete frame.
    Frame(Vec<u8>),
    /// The peer closed the transport cleanly.
    Closed,
    /// The transport failed.
    Error(String),
}

/// A duplex, message-oriented peer transport.
#[async_trait]
pub trait Transport: Send {
    /// Sends one frame.
    async fn send(&mut self, frame: Vec<u8>) -> SendStatus;

    /// Receives the next frame, waiting until one arrives or the
    /// transport closes or fails.
    async fn recv(&mut self) -> Inbound;

    /// Closes the transport, optionally carrying a reason the peer can
    /// distinguish from network loss. Idempotent.
    async fn close(&mut self, reason: Option<&str>);
}

/// In-memory transport pair for tests.
pub mod mock {
    use super::{Inbound, SendStatus, Transport};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// The session-side half of an in-memory transport.
    pub struct MockTransport {
        inbound: mpsc::Receiver<Vec<u8>>,
        outbound: mpsc::Sender<Vec<u8>>,
        closed: bool,
        close_reason: Arc<Mutex<Option<String>>>,
    }

    /// The peer-side half: what the browser would see.
    pub struct MockPeer {
        to_session: mpsc::Sender<Vec<u8>>,
        from_session: mpsc::Receiver<Vec<u8>>,
        close_reason: Arc<Mutex<Option<String>>>,
    }

    /// Creates a connected transport/peer pair with `capacity` frames
    /// of buffering in each direction.
    #[must_use]
    pub fn pair(capacity: usize) -> (MockTransport, MockPeer) {
        let (to_session, inbound) = mpsc::channel(capacity);
        let (outbound, from_session) = mpsc::channel(capacity);
        let close_reason = Arc::new(Mutex::new(None));
        (
            MockTransport {
                inbound,
                outbound,
                closed: false,
                close_reason: close_reason.clone(),
            },
            MockPeer {
                to_session,
                from_session,
                close_reason,
            },
        )
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, frame: Vec<u8>) -> SendStatus {
            if self.closed {
                return SendStatus::Closed;
            }
            match self.outbound.try_send(frame) {
                Ok(()) => SendStatus::Sent,
                Err(mpsc::error::TrySendError::Full(_)) => SendStatus::Backpressure,
                Err(mpsc::error::TrySendError::Closed(_)) => SendStatus::Closed,
            }
        }

        async fn recv(&mut self) -> Inbound {
            if self.closed {
                return Inbound::Closed;
            }
            match self.inbound.recv().await {
                Some(frame) => Inbound::Frame(frame),
                None => Inbound::Closed,
            }
        }

        async fn close(&mut self, reason: Option<&str>) {
            if !self.closed {
                self.closed = true;
                *self.close_reason.lock().unwrap() = reason.map(str::to_string);
            }
        }
    }

    impl MockPeer {
        /// Sends a JSON frame to the session.
        pub async fn send_json(&self, value: &Value) {
            let _ = self
                .to_session
                .send(serde_json::to_vec(value).unwrap())
                .await;
        }

        /// Sends raw bytes to the session.
        pub async fn send_raw(&self, bytes: Vec<u8>) {
            let _ = self.to_session.send(bytes).await;
        }

        /// Receives the next frame from the session, decoded as JSON.
        /// Returns `None` once the session side is gone.
        pub async fn recv_json(&mut self) -> Option<Value> {
            let bytes = self.from_session.recv().await?;
            serde_json::from_slice(&bytes).ok()
        }

        /// Drops the sending half, as a vanished peer would.
        pub fn disconnect(&mut self) {
            self.to_session = mpsc::channel(1).0;
        }

        /// The reason the session gave when it closed, if it has.
        pub fn close_reason(&self) -> Option<String> {
            self.close_reason.lock().unwrap().clone()
        }
    }

}
