// DG-Lab Relay: terminal/app pairing hub
//
// Terminals and apps connect to the hub, get an id each, and bind one
// terminal to one app. From then on the hub relays control messages between
// the pair and tells the survivor when the other side goes away.

pub mod client;
pub mod protocol;
pub mod relay;

pub use client::{
    ClientError, ClientTransport, LocalTerminal, LocalTransport, TerminalClient, TerminalEvent,
    TerminalEventKind, WsTerminal, WsTransport,
};
pub use protocol::{
    Channel, Envelope, FeedbackButton, MessageBody, MessageType, PayloadError, ProtocolError,
    PulseOperation, RetCode, Sentinel, StrengthData, StrengthOperationType,
};
pub use relay::{RelayHub, RelayHubStats, RelayServer, RelayServerConfig, RelayServerError};
