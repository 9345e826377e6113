//! Terminal-side client
//!
//! [`TerminalClient`] drives the register → bind → exchange state machine
//! over any [`ClientTransport`]: a WebSocket connection to a hub
//! ([`WsTransport`]) or an in-process queue fed by a colocated hub
//! ([`LocalTransport`]).

pub mod local;
pub mod terminal;
pub mod ws;

pub use local::{LocalTerminal, LocalTransport};
pub use terminal::{TerminalClient, TerminalEvent, TerminalEventKind};
pub use ws::{WsTerminal, WsTransport};

use crate::protocol::{Envelope, PayloadError, ProtocolError, MAX_PULSES_PER_MESSAGE, MAX_STRENGTH_VALUE};
use async_trait::async_trait;
use thiserror::Error;

/// Terminal client error types
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Too many pulses: {0} (at most {max} per message)", max = MAX_PULSES_PER_MESSAGE)]
    TooManyPulses(usize),
    #[error("Strength {0} out of range (at most {max})", max = MAX_STRENGTH_VALUE)]
    StrengthOutOfRange(u8),
}

/// Envelope transport underneath a [`TerminalClient`]
#[async_trait]
pub trait ClientTransport: Send {
    /// Next inbound envelope, waiting until one arrives
    async fn recv(&mut self) -> Result<Envelope, ClientError>;

    /// Send one envelope to the hub
    async fn send(&mut self, envelope: Envelope) -> Result<(), ClientError>;

    /// URI of the hub this transport is connected to, if it has one
    fn server_uri(&self) -> Option<&str> {
        None
    }
}
