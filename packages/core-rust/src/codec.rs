//! Typed payload codec: serde message in, [`Envelope`] out, and back.
//!
//! Round-trip law: `decode(encode(m, h)) == (m, h)` for every valid message
//! `m` and header map `h`. The codec never guesses: undecodable bytes always
//! surface as [`DecodeError`], and error envelopes are rejected before the
//! payload is touched so they can never masquerade as a response.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::{DecodeError, EncodeError, Envelope};
use crate::headers::Headers;

/// Default payload size limit (1 MiB), matching common broker message caps.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Encodes a typed message and headers into an envelope.
///
/// # Errors
///
/// Returns [`EncodeError::PayloadTooLarge`] if the serialized payload exceeds
/// `max_payload`, or [`EncodeError::Serialize`] on serialization failure.
pub fn encode<T: Serialize>(
    message: &T,
    headers: Headers,
    max_payload: usize,
) -> Result<Envelope, EncodeError> {
    let payload = rmp_serde::to_vec_named(message)?;
    if payload.len() > max_payload {
        return Err(EncodeError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload,
        });
    }
    Ok(Envelope::new(headers, Bytes::from(payload)))
}

/// Decodes an envelope into a typed message plus its headers.
///
/// # Errors
///
/// Returns [`DecodeError::ErrorEnvelope`] if the envelope carries the error
/// marker headers, or [`DecodeError::Malformed`] if the payload does not
/// match the expected schema.
pub fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<(T, Headers), DecodeError> {
    if let Some(err) = envelope.service_error() {
        return Err(DecodeError::ErrorEnvelope(err));
    }
    let message = rmp_serde::from_slice(&envelope.payload)?;
    Ok((message, envelope.headers.clone()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
