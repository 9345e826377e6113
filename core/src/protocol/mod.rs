// Relay protocol: envelope model, JSON codec, MESSAGE body payloads

pub mod codec;
pub mod envelope;
pub mod payload;
pub mod types;

pub use codec::{
    decode_envelope, decode_envelope_bytes, encode_envelope, ProtocolError, MAX_MESSAGE_LENGTH,
};
pub use envelope::{Envelope, MessageBody};
pub use payload::{
    dg_lab_client_qrcode, dump_add_pulses, dump_clear_pulses, dump_pulse_operation,
    dump_strength_operation, parse_feedback_data, parse_strength_data, PayloadError,
    MAX_PULSES_PER_MESSAGE, MAX_STRENGTH_VALUE,
};
pub use types::{
    Channel, FeedbackButton, MessageType, PayloadHead, PulseOperation, RetCode, Sentinel,
    StrengthData, StrengthOperationType, WaveformFrequencyOperation, WaveformStrengthOperation,
};
