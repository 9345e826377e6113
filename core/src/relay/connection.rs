//! Peer connection abstraction
//!
//! The hub delivers envelopes to two kinds of peers: networked peers behind a
//! duplex wire connection, and local terminals living in the same process
//! behind a bounded queue. Forwarding logic only ever asks which of the two a
//! destination is.

use crate::protocol::{encode_envelope, Envelope, ProtocolError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default capacity of a local terminal's inbound queue
pub const DEFAULT_LOCAL_QUEUE_CAPACITY: usize = 32;

/// Delivery failures
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Local queue closed")]
    QueueClosed,
}

/// Outbound half of a networked peer's wire connection
#[async_trait]
pub trait WireSink: Send + Sync {
    /// Send one text frame
    async fn send_text(&self, text: String) -> Result<(), DeliveryError>;
}

/// Sender side of a local terminal's inbound queue
pub type LocalQueue = mpsc::Sender<Envelope>;

/// Handle the hub uses to reach a peer
#[derive(Clone)]
pub enum PeerConnection {
    /// External duplex connection; envelopes are serialized to text frames
    Networked(Arc<dyn WireSink>),
    /// In-process terminal; envelopes are queued as-is
    Local(LocalQueue),
}

impl PeerConnection {
    pub fn is_local(&self) -> bool {
        matches!(self, PeerConnection::Local(_))
    }

    /// Deliver an envelope, waiting for queue space on local peers
    pub async fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        match self {
            PeerConnection::Networked(sink) => {
                let text = encode_envelope(envelope)?;
                sink.send_text(text).await
            }
            PeerConnection::Local(queue) => queue
                .send(envelope.clone())
                .await
                .map_err(|_| DeliveryError::QueueClosed),
        }
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerConnection::Networked(_) => f.write_str("PeerConnection::Networked"),
            PeerConnection::Local(_) => f.write_str("PeerConnection::Local"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::channel_sink;
    use super::*;
    use crate::protocol::{decode_envelope, RetCode};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_networked_delivery_serializes() {
        let (sink, mut rx) = channel_sink();
        let conn = PeerConnection::Networked(sink);
        let envelope = Envelope::heartbeat(Uuid::new_v4(), None);

        conn.deliver(&envelope).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(decode_envelope(&frame).unwrap(), envelope);
        assert!(!conn.is_local());
    }

    #[tokio::test]
    async fn test_local_delivery_queues_envelope() {
        let (tx, mut rx) = mpsc::channel(DEFAULT_LOCAL_QUEUE_CAPACITY);
        let conn = PeerConnection::Local(tx);
        let envelope = Envelope::disconnected(Uuid::new_v4(), Uuid::new_v4());

        conn.deliver(&envelope).await.unwrap();

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.body().as_code(), Some(RetCode::ClientDisconnected));
        assert!(conn.is_local());
    }

    #[tokio::test]
    async fn test_local_delivery_to_dropped_queue() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let conn = PeerConnection::Local(tx);

        let result = conn.deliver(&Envelope::identity(Uuid::new_v4())).await;
        assert!(matches!(result, Err(DeliveryError::QueueClosed)));
    }
}
