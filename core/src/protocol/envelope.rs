// Envelope: the unit exchanged between hub, terminals and apps

use super::types::{MessageType, RetCode, Sentinel};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Envelope body.
///
/// On receipt a wire string is re-typed: a known result code first, then a
/// bind-phase sentinel, otherwise it stays raw text for the MESSAGE
/// sub-protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Code(RetCode),
    Token(Sentinel),
    Text(String),
}

impl MessageBody {
    /// Re-type a wire string
    pub fn parse(raw: &str) -> Self {
        if let Some(code) = raw.parse::<u16>().ok().and_then(RetCode::from_code) {
            return MessageBody::Code(code);
        }
        if let Some(token) = Sentinel::from_token(raw) {
            return MessageBody::Token(token);
        }
        MessageBody::Text(raw.to_string())
    }

    pub fn as_code(&self) -> Option<RetCode> {
        match self {
            MessageBody::Code(code) => Some(*code),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Length of the body as it appears on the wire
    pub fn wire_len(&self) -> usize {
        match self {
            MessageBody::Code(code) => code.to_string().len(),
            MessageBody::Token(token) => token.as_str().len(),
            MessageBody::Text(text) => text.len(),
        }
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageBody::Code(code) => write!(f, "{}", code),
            MessageBody::Token(token) => f.write_str(token.as_str()),
            MessageBody::Text(text) => f.write_str(text),
        }
    }
}

impl From<RetCode> for MessageBody {
    fn from(code: RetCode) -> Self {
        MessageBody::Code(code)
    }
}

impl From<Sentinel> for MessageBody {
    fn from(token: Sentinel) -> Self {
        MessageBody::Token(token)
    }
}

impl From<String> for MessageBody {
    fn from(raw: String) -> Self {
        MessageBody::parse(&raw)
    }
}

impl From<&str> for MessageBody {
    fn from(raw: &str) -> Self {
        MessageBody::parse(raw)
    }
}

/// A relay envelope.
///
/// `client_id` always names the terminal side and `target_id` the app side
/// of a relationship. An envelope does not change once built; responses
/// are new envelopes made with [`Envelope::reply`], which only swaps the
/// kind and body.
///
/// ```compile_fail
/// use dglab_relay_core::{Envelope, MessageType, RetCode};
///
/// let mut envelope = Envelope::notice(MessageType::Msg, RetCode::Success);
/// envelope.kind = MessageType::Break;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct Envelope {
    kind: MessageType,
    client_id: Option<Uuid>,
    target_id: Option<Uuid>,
    body: MessageBody,
}

impl Envelope {
    pub fn new(
        kind: MessageType,
        client_id: Option<Uuid>,
        target_id: Option<Uuid>,
        body: impl Into<MessageBody>,
    ) -> Self {
        Self {
            kind,
            client_id,
            target_id,
            body: body.into(),
        }
    }

    /// Identity assignment sent to a freshly registered peer
    pub fn identity(peer_id: Uuid) -> Self {
        Self::new(MessageType::Bind, Some(peer_id), None, Sentinel::TargetId)
    }

    /// Bind request naming the terminal and the app
    pub fn bind_request(client_id: Uuid, target_id: Uuid) -> Self {
        Self::new(
            MessageType::Bind,
            Some(client_id),
            Some(target_id),
            Sentinel::DgLab,
        )
    }

    /// Heartbeat for `peer_id`, naming its bound counterpart if any
    pub fn heartbeat(peer_id: Uuid, counterpart: Option<Uuid>) -> Self {
        Self::new(
            MessageType::Heartbeat,
            Some(peer_id),
            counterpart,
            RetCode::Success,
        )
    }

    /// Disconnect notice for a torn-down relationship
    pub fn disconnected(client_id: Uuid, target_id: Uuid) -> Self {
        Self::new(
            MessageType::Break,
            Some(client_id),
            Some(target_id),
            RetCode::ClientDisconnected,
        )
    }

    /// Hub notice carrying only a result code
    pub fn notice(kind: MessageType, code: RetCode) -> Self {
        Self::new(kind, None, None, code)
    }

    /// Control message between a bound pair
    pub fn message(client_id: Uuid, target_id: Uuid, body: impl Into<MessageBody>) -> Self {
        Self::new(MessageType::Msg, Some(client_id), Some(target_id), body)
    }

    /// Copy of this envelope with a new kind and body, ids untouched
    pub fn reply(&self, kind: MessageType, body: impl Into<MessageBody>) -> Self {
        Self {
            kind,
            client_id: self.client_id,
            target_id: self.target_id,
            body: body.into(),
        }
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Terminal side
    pub fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    /// App side
    pub fn target_id(&self) -> Option<Uuid> {
        self.target_id
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Both ids, if both are present
    pub fn pair(&self) -> Option<(Uuid, Uuid)> {
        Some((self.client_id?, self.target_id?))
    }
}

/// JSON shape on the wire: camelCase keys, ids as strings (empty = absent)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    target_id: String,
    message: String,
}

fn parse_id(raw: &str) -> Result<Option<Uuid>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|e| format!("invalid identifier {:?}: {}", raw, e))
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: wire.kind,
            client_id: parse_id(&wire.client_id)?,
            target_id: parse_id(&wire.target_id)?,
            body: MessageBody::parse(&wire.message),
        })
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        Self {
            kind: envelope.kind,
            client_id: envelope.client_id.map(|id| id.to_string()).unwrap_or_default(),
            target_id: envelope.target_id.map(|id| id.to_string()).unwrap_or_default(),
            message: envelope.body.to_string(),
        }
    }
}
