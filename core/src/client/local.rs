//! In-process transport: a terminal colocated with the hub
//!
//! Inbound envelopes arrive on a bounded queue the hub writes to directly.
//! Outbound envelopes are handed to [`RelayHub::handle`] on the caller's task,
//! with no serialization on either path.

use super::{ClientError, ClientTransport, TerminalClient};
use crate::protocol::Envelope;
use crate::relay::RelayHub;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Terminal living in the hub's process
pub type LocalTerminal = TerminalClient<LocalTransport>;

pub struct LocalTransport {
    hub: Arc<RelayHub>,
    inbox: mpsc::Receiver<Envelope>,
}

impl LocalTransport {
    pub(crate) fn new(hub: Arc<RelayHub>, inbox: mpsc::Receiver<Envelope>) -> Self {
        Self { hub, inbox }
    }

    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }
}

#[async_trait]
impl ClientTransport for LocalTransport {
    async fn recv(&mut self) -> Result<Envelope, ClientError> {
        self.inbox.recv().await.ok_or(ClientError::ConnectionClosed)
    }

    async fn send(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        self.hub.handle(envelope, None).await;
        Ok(())
    }
}
