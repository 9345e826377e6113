// Envelope codec over JSON text frames

use super::envelope::Envelope;
use thiserror::Error;

/// Longest MESSAGE body the app accepts (MESSAGE_TOO_LONG above this)
pub const MAX_MESSAGE_LENGTH: usize = 1950;

/// Envelope serialization errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Encode error: {0}")]
    Encode(serde_json::Error),
    #[error("Decode error: {0}")]
    Decode(serde_json::Error),
    #[error("Frame is not valid UTF-8")]
    NotUtf8,
}

/// Serialize an envelope to its JSON wire form
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(ProtocolError::Encode)
}

/// Parse a JSON text frame into an envelope
pub fn decode_envelope(text: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Parse a binary frame holding UTF-8 JSON
pub fn decode_envelope_bytes(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
    decode_envelope(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageBody, MessageType, RetCode, Sentinel};
    use uuid::Uuid;

    #[test]
    fn test_envelope_roundtrip_preserves_fields() {
        let c = Uuid::new_v4();
        let t = Uuid::new_v4();
        let cases = vec![
            Envelope::identity(c),
            Envelope::bind_request(c, t),
            Envelope::heartbeat(c, None),
            Envelope::disconnected(c, t),
            Envelope::message(c, t, "strength-5+5+100+100"),
            Envelope::notice(MessageType::Error, RetCode::ServerInternalError),
        ];

        for envelope in cases {
            let text = encode_envelope(&envelope).unwrap();
            let restored = decode_envelope(&text).unwrap();
            assert_eq!(envelope, restored, "roundtrip of {}", text);
        }
    }

    #[test]
    fn test_identity_wire_shape() {
        let id = Uuid::new_v4();
        let text = encode_envelope(&Envelope::identity(id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "bind");
        assert_eq!(value["clientId"], id.to_string());
        assert_eq!(value["targetId"], "");
        assert_eq!(value["message"], "targetId");
    }

    #[test]
    fn test_decode_non_json() {
        assert!(matches!(
            decode_envelope("hello"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            decode_envelope(r#"{"type":"nope","message":"1"}"#),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            decode_envelope_bytes(&[0xff, 0xfe]),
            Err(ProtocolError::NotUtf8)
        ));
    }

    #[test]
    fn test_decode_app_frame() {
        let c = Uuid::new_v4();
        let t = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"bind","clientId":"{}","targetId":"{}","message":"DGLAB"}}"#,
            c, t
        );
        let envelope = decode_envelope(&raw).unwrap();

        assert_eq!(envelope.kind(), MessageType::Bind);
        assert_eq!(envelope.pair(), Some((c, t)));
        assert_eq!(envelope.body(), &MessageBody::Token(Sentinel::DgLab));
    }
}
