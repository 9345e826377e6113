//! Relay hub pairing terminals with apps and routing envelopes between them
//!
//! Networked peers reach the hub over WebSocket ([`RelayServer`]); terminals
//! living in the same process attach through [`RelayHub::new_local_client`].
//! Both go through one dispatch path in [`RelayHub::handle`].

pub mod binding;
pub mod connection;
pub mod heartbeat;
pub mod hub;
pub mod registry;
pub mod server;

pub use binding::{BindingTable, Unbound};
pub use connection::{
    DeliveryError, LocalQueue, PeerConnection, WireSink, DEFAULT_LOCAL_QUEUE_CAPACITY,
};
pub use heartbeat::HeartbeatDriver;
pub use hub::{EnvelopeCallback, HubConfig, PeerCallback, RelayHub, RelayHubStats};
pub use registry::Registry;
pub use server::{RelayServer, RelayServerConfig, RelayServerError};
