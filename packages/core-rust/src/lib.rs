//! `wirebus` Core — envelope wire format, typed payload codec, and subject naming.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod subject;

pub use envelope::{DecodeError, EncodeError, Envelope};
pub use error::ServiceError;
pub use headers::Headers;
pub use subject::{new_inbox, ServiceIdent, SubjectError};
