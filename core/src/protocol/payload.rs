//! MESSAGE body sub-protocol: strength, feedback and waveform payloads,
//! plus the QR payload the app scans to find a terminal.

use super::types::{
    Channel, FeedbackButton, PayloadHead, PulseOperation, StrengthData, StrengthOperationType,
};
use thiserror::Error;
use uuid::Uuid;

/// Largest pulse list a single add-pulses message may carry.
///
/// Observed working bound for the app's ~1950 byte message budget.
pub const MAX_PULSES_PER_MESSAGE: usize = 86;

/// Highest strength value a set-strength command accepts
pub const MAX_STRENGTH_VALUE: u8 = 200;

const QRCODE_PREFIX: &str = "https://www.dungeon-lab.com/app-download.php#DGLAB-SOCKET#";

/// Errors raised while interpreting a MESSAGE body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Invalid strength data: {0}")]
    InvalidStrengthData(String),
    #[error("Invalid feedback data: {0}")]
    InvalidFeedbackData(String),
}

/// Parse a strength report `strength-<a>+<b>+<aLimit>+<bLimit>`
pub fn parse_strength_data(data: &str) -> Result<StrengthData, PayloadError> {
    let invalid = || PayloadError::InvalidStrengthData(data.to_string());

    let values = data.split('-').nth(1).ok_or_else(invalid)?;
    let parsed: Vec<u8> = values
        .split('+')
        .map(|v| v.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;

    match parsed.as_slice() {
        [a, b, a_limit, b_limit, ..] => Ok(StrengthData {
            a: *a,
            b: *b,
            a_limit: *a_limit,
            b_limit: *b_limit,
        }),
        _ => Err(invalid()),
    }
}

/// Parse a feedback report `feedback-<index>`
pub fn parse_feedback_data(data: &str) -> Result<FeedbackButton, PayloadError> {
    data.split('-')
        .nth(1)
        .and_then(|v| v.trim().parse::<u8>().ok())
        .and_then(FeedbackButton::from_index)
        .ok_or_else(|| PayloadError::InvalidFeedbackData(data.to_string()))
}

/// Build a set-strength command body
pub fn dump_strength_operation(
    channel: Channel,
    operation_type: StrengthOperationType,
    value: u8,
) -> String {
    format!(
        "{}-{}+{}+{}",
        PayloadHead::Strength.as_str(),
        channel.value(),
        operation_type.value(),
        value
    )
}

/// Build a clear-waveform command body
pub fn dump_clear_pulses(channel: Channel) -> String {
    format!("{}-{}", PayloadHead::Clear.as_str(), channel.value())
}

/// Encode one waveform step as 8 bytes of lowercase hex
pub fn dump_pulse_operation(pulse: &PulseOperation) -> String {
    let (frequency, strength) = pulse;
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(frequency);
    bytes[4..].copy_from_slice(strength);
    hex::encode(bytes)
}

/// Build an add-waveform command body: `pulse-<channel>:["<hex>",...]`
pub fn dump_add_pulses(channel: Channel, pulses: &[PulseOperation]) -> String {
    let steps: Vec<String> = pulses.iter().map(dump_pulse_operation).collect();
    format!(
        "{}-{}:{}",
        PayloadHead::Pulse.as_str(),
        channel.value(),
        serde_json::Value::from(steps)
    )
}

/// QR payload the app scans to connect to a terminal.
///
/// `uri` is the hub's own `scheme://host:port`; a trailing slash is dropped.
pub fn dg_lab_client_qrcode(uri: &str, client_id: Uuid) -> String {
    format!("{}{}/{}", QRCODE_PREFIX, uri.trim_end_matches('/'), client_id)
}
