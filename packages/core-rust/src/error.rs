//! Structured service errors carried in error envelopes.

use serde::{Deserialize, Serialize};

/// Well-known error codes used by the runtime itself.
///
/// Handlers are free to use their own codes; these are the ones the
/// dispatcher emits on its own behalf.
pub mod codes {
    /// Handler returned or raised an unclassified failure.
    pub const INTERNAL: &str = "500";
    /// The request's propagated deadline expired before the handler finished.
    pub const DEADLINE_EXCEEDED: &str = "408";
    /// The inbound payload could not be decoded into the request type.
    pub const BAD_REQUEST: &str = "400";
}

/// Application-level failure surfaced by a handler.
///
/// Travels as an error envelope (marker headers + these two fields), so the
/// caller always receives a typed error rather than a corrupted response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("service error {code}: {message}")]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl ServiceError {
    /// Creates a service error with the given code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates an internal (code 500) error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }
}
