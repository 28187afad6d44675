//! Deterministic subject naming shared by clients and services.
//!
//! A method subject is `{service_name}.{version}.{method_name}`. Service and
//! method tokens are dot-free, so the mapping is collision-free even though
//! versions themselves contain dots (name is everything before the first
//! dot, method everything after the last).

use std::fmt;

/// Invalid token in a subject component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectError {
    #[error("{component} must not be empty")]
    Empty { component: &'static str },
    #[error("{component} {token:?} contains an illegal character ({reason})")]
    IllegalChar {
        component: &'static str,
        token: String,
        reason: &'static str,
    },
}

fn validate(component: &'static str, token: &str, allow_dots: bool) -> Result<(), SubjectError> {
    if token.is_empty() {
        return Err(SubjectError::Empty { component });
    }
    for ch in token.chars() {
        let reason = match ch {
            c if c.is_whitespace() => Some("whitespace"),
            '*' | '>' => Some("wildcard character"),
            '.' if !allow_dots => Some("dot"),
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(SubjectError::IllegalChar {
                component,
                token: token.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

/// Identity of a service: name plus version.
///
/// Both sides of an RPC derive the same subjects from the same ident, which
/// is what makes the naming scheme usable for both subscription and request
/// destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdent {
    name: String,
    version: String,
}

impl ServiceIdent {
    /// Creates a validated service identity.
    ///
    /// # Errors
    ///
    /// Returns [`SubjectError`] if the name is empty or contains dots,
    /// whitespace, or wildcard characters, or if the version is empty or
    /// contains whitespace or wildcards (dots are allowed in versions).
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, SubjectError> {
        let name = name.into();
        let version = version.into();
        validate("service name", &name, false)?;
        validate("version", &version, true)?;
        Ok(Self { name, version })
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Derives the subject for one of this service's methods.
    ///
    /// # Errors
    ///
    /// Returns [`SubjectError`] if the method token is invalid.
    pub fn subject(&self, method: &str) -> Result<String, SubjectError> {
        validate("method name", method, false)?;
        Ok(format!("{}.{}.{}", self.name, self.version, method))
    }
}

impl fmt::Display for ServiceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.version)
    }
}

/// Generates a fresh reply-inbox subject for request/reply correlation.
#[must_use]
pub fn new_inbox() -> String {
    format!("_INBOX.{}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
