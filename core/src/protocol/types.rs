// Protocol constants: message kinds, result codes, control tokens

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of envelope this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Liveness probe sent by the hub to every networked peer
    Heartbeat,
    /// Identity assignment and terminal/app binding
    Bind,
    /// Control payload relayed between a bound pair
    #[serde(rename = "msg")]
    Msg,
    /// Counterpart disconnected
    Break,
    /// Service error
    Error,
}

impl MessageType {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Heartbeat => "heartbeat",
            MessageType::Bind => "bind",
            MessageType::Msg => "msg",
            MessageType::Break => "break",
            MessageType::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric result codes carried in envelope bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetCode {
    /// Success
    Success,
    /// The other side of the relationship disconnected
    ClientDisconnected,
    /// QR payload carried no valid client id
    InvalidClientId,
    /// Socket connected but the hub never issued an id
    ServerDelay,
    /// One of the ids is already bound to another peer
    IdAlreadyBound,
    /// The peer named in a bind request is not connected
    TargetClientNotFound,
    /// Sender and recipient are not a bound pair
    IncompatibleRelationship,
    /// Inbound frame was not a valid JSON envelope
    NonJsonContent,
    /// Recipient not found (offline)
    RecipientNotFound,
    /// Message body longer than the relay accepts
    MessageTooLong,
    /// Hub internal error
    ServerInternalError,
}

impl RetCode {
    pub const ALL: [RetCode; 11] = [
        RetCode::Success,
        RetCode::ClientDisconnected,
        RetCode::InvalidClientId,
        RetCode::ServerDelay,
        RetCode::IdAlreadyBound,
        RetCode::TargetClientNotFound,
        RetCode::IncompatibleRelationship,
        RetCode::NonJsonContent,
        RetCode::RecipientNotFound,
        RetCode::MessageTooLong,
        RetCode::ServerInternalError,
    ];

    /// Integer value used on the wire
    pub fn code(&self) -> u16 {
        match self {
            RetCode::Success => 200,
            RetCode::ClientDisconnected => 209,
            RetCode::InvalidClientId => 210,
            RetCode::ServerDelay => 211,
            RetCode::IdAlreadyBound => 400,
            RetCode::TargetClientNotFound => 401,
            RetCode::IncompatibleRelationship => 402,
            RetCode::NonJsonContent => 403,
            RetCode::RecipientNotFound => 404,
            RetCode::MessageTooLong => 405,
            RetCode::ServerInternalError => 500,
        }
    }

    /// Look up a known result code by its integer value
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn is_success(&self) -> bool {
        *self == RetCode::Success
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Literal tokens the hub inspects during the bind phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// Sent by the hub to a new peer so it learns its own id
    TargetId,
    /// Sent by the binding initiator to request a bind
    DgLab,
}

impl Sentinel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::TargetId => "targetId",
            Sentinel::DgLab => "DGLAB",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "targetId" => Some(Sentinel::TargetId),
            "DGLAB" => Some(Sentinel::DgLab),
            _ => None,
        }
    }
}

/// Prefixes of the MESSAGE body sub-protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadHead {
    Strength,
    Pulse,
    Clear,
    Feedback,
}

impl PayloadHead {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadHead::Strength => "strength",
            PayloadHead::Pulse => "pulse",
            PayloadHead::Clear => "clear",
            PayloadHead::Feedback => "feedback",
        }
    }
}

/// Output channel of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub fn value(&self) -> u8 {
        match self {
            Channel::A => 1,
            Channel::B => 2,
        }
    }
}

/// How a strength command changes the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrengthOperationType {
    Decrease,
    Increase,
    SetTo,
}

impl StrengthOperationType {
    pub fn value(&self) -> u8 {
        match self {
            StrengthOperationType::Decrease => 0,
            StrengthOperationType::Increase => 1,
            StrengthOperationType::SetTo => 2,
        }
    }
}

/// Feedback buttons on the app.
///
/// Channel A buttons are indexed 0..=4 from left to right, channel B
/// buttons 5..=9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackButton {
    A1,
    A2,
    A3,
    A4,
    A5,
    B1,
    B2,
    B3,
    B4,
    B5,
}

impl FeedbackButton {
    const ORDER: [FeedbackButton; 10] = [
        FeedbackButton::A1,
        FeedbackButton::A2,
        FeedbackButton::A3,
        FeedbackButton::A4,
        FeedbackButton::A5,
        FeedbackButton::B1,
        FeedbackButton::B2,
        FeedbackButton::B3,
        FeedbackButton::B4,
        FeedbackButton::B5,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ORDER.get(index as usize).copied()
    }

    pub fn index(&self) -> u8 {
        Self::ORDER
            .iter()
            .position(|b| b == self)
            .unwrap_or_default() as u8
    }

    pub fn channel(&self) -> Channel {
        if self.index() < 5 {
            Channel::A
        } else {
            Channel::B
        }
    }
}

/// Strength report sent by the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrengthData {
    /// Channel A strength
    pub a: u8,
    /// Channel B strength
    pub b: u8,
    /// Channel A upper limit
    pub a_limit: u8,
    /// Channel B upper limit
    pub b_limit: u8,
}

/// Four frequency bytes for 4 x 25ms slots
pub type WaveformFrequencyOperation = [u8; 4];

/// Four strength bytes (0..=100) for 4 x 25ms slots
pub type WaveformStrengthOperation = [u8; 4];

/// One 100ms waveform step: frequencies followed by strengths
pub type PulseOperation = (WaveformFrequencyOperation, WaveformStrengthOperation);
