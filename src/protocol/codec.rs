//! Envelope codec.
//!
//! Wire format: one envelope per transport message, JSON text.
//!
//! ```text
//! {"kind":"label","label":{"type":"stimulus","name":"open",...},
//!  "timestamp_ns":1718000000000000000,"correlation_id":"c1"}
//! ```
//!
//! Binary messages are accepted on decode when they carry UTF-8 JSON;
//! encode always produces text.

use crate::connection::Payload;
use crate::error::CodecError;

use super::envelope::Envelope;

/// Encode an envelope into a transport payload.
pub fn encode(envelope: &Envelope) -> Result<Payload, CodecError> {
    Ok(Payload::Text(serde_json::to_string(envelope)?))
}

/// Decode a transport payload into an envelope.
pub fn decode(payload: &Payload) -> Result<Envelope, CodecError> {
    let text = match payload {
        Payload::Text(text) => text.as_str(),
        Payload::Binary(bytes) => core::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?,
    };
    Ok(serde_json::from_str(text)?)
}
