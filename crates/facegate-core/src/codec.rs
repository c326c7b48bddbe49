//! Reversible text tokens for descriptors in storage and transit.
//!
//! Token layout: `<unix-millis>.<base64(le f32 bytes)>`. The `.` delimiter is
//! outside both the decimal and the standard base64 alphabets, so a valid token
//! contains exactly one. Raw bit patterns are encoded, so decoding is exact.

use crate::error::MatchError;
use crate::types::FaceDescriptor;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const DELIMITER: char = '.';

/// Encode a descriptor, stamping the current time.
pub fn encode(descriptor: &FaceDescriptor) -> String {
    encode_at(descriptor, chrono::Utc::now().timestamp_millis())
}

/// Encode a descriptor with an explicit timestamp marker.
pub fn encode_at(descriptor: &FaceDescriptor, timestamp_millis: i64) -> String {
    let bytes: Vec<u8> = descriptor
        .values()
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    format!("{timestamp_millis}{DELIMITER}{}", STANDARD.encode(bytes))
}

/// Decode a token produced by [`encode`].
pub fn decode(token: &str) -> Result<FaceDescriptor, MatchError> {
    decode_with_timestamp(token).map(|(descriptor, _)| descriptor)
}

/// Decode a token, also returning its timestamp marker.
pub fn decode_with_timestamp(token: &str) -> Result<(FaceDescriptor, i64), MatchError> {
    let mut parts = token.split(DELIMITER);
    let (Some(stamp), Some(payload), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(MatchError::MalformedToken(format!(
            "expected exactly one '{DELIMITER}' delimiter"
        )));
    };

    let timestamp = stamp
        .parse::<i64>()
        .map_err(|e| MatchError::MalformedToken(format!("timestamp marker: {e}")))?;

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| MatchError::MalformedToken(format!("payload: {e}")))?;

    if bytes.len() % 4 != 0 {
        return Err(MatchError::MalformedToken(format!(
            "payload length {} is not a whole number of f32 values",
            bytes.len()
        )));
    }

    let values = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok((FaceDescriptor::new(values), timestamp))
}
