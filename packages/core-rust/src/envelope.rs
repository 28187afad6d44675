//! The wire envelope: an ordered header map plus an opaque binary payload.
//!
//! Envelopes are what actually travels over the broker. The payload is
//! opaque at this layer; typed encoding/decoding lives in [`crate::codec`].
//! Error replies are ordinary envelopes marked by reserved headers, so a
//! decoder can always tell a failure apart from a normal payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::headers::Headers;

/// Reserved header names used by the runtime.
pub mod reserved {
    /// Marks an error envelope; holds the structured error code.
    pub const ERROR_CODE: &str = "Service-Error-Code";
    /// Error message accompanying [`ERROR_CODE`].
    pub const ERROR_MESSAGE: &str = "Service-Error-Message";
    /// Absolute request deadline in unix-epoch milliseconds, stamped by the
    /// client and enforced server-side.
    pub const DEADLINE_MS: &str = "Deadline-Ms";
}

/// Headers plus opaque payload, MsgPack-framed on the wire.
///
/// Invariants: header keys are unique (enforced by [`Headers`]); the payload
/// is never inspected by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub headers: Headers,
    pub payload: Bytes,
}

/// Failure to serialize an envelope or payload.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("payload of {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("serialization failed: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),
}

/// Failure to deserialize an envelope or payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope or payload: {0}")]
    Malformed(#[from] rmp_serde::decode::Error),
    #[error("reply is an error envelope: {0}")]
    ErrorEnvelope(ServiceError),
}

impl Envelope {
    /// Creates an envelope from headers and a payload.
    #[must_use]
    pub fn new(headers: Headers, payload: Bytes) -> Self {
        Self { headers, payload }
    }

    /// Builds an error envelope for the given structured error.
    ///
    /// Code and message travel in reserved headers; the payload is empty.
    #[must_use]
    pub fn error(err: &ServiceError) -> Self {
        let mut headers = Headers::new();
        headers.insert(reserved::ERROR_CODE, err.code.clone());
        headers.insert(reserved::ERROR_MESSAGE, err.message.clone());
        Self {
            headers,
            payload: Bytes::new(),
        }
    }

    /// Returns the structured error if this is an error envelope.
    #[must_use]
    pub fn service_error(&self) -> Option<ServiceError> {
        let code = self.headers.get(reserved::ERROR_CODE)?;
        let message = self.headers.get(reserved::ERROR_MESSAGE).unwrap_or("");
        Some(ServiceError::new(code, message))
    }

    /// Serializes the envelope into its wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Serialize`] if MsgPack framing fails.
    pub fn to_wire(&self) -> Result<Bytes, EncodeError> {
        Ok(Bytes::from(rmp_serde::to_vec_named(self)?))
    }

    /// Parses an envelope from its wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] on truncated or invalid frames.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
