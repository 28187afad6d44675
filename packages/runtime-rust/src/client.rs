//! Client stub: typed, correlated calls over the transport.
//!
//! One `ServiceClient` per target service. Every call is encode -> derive
//! subject -> request-with-timeout -> decode; nothing is retried
//! implicitly, so retry policy stays with the caller.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use wirebus_core::envelope::reserved;
use wirebus_core::{codec, DecodeError, EncodeError, Headers, ServiceError, ServiceIdent, SubjectError};

use crate::config::RuntimeConfig;
use crate::transport::{Transport, TransportError};

/// Failure of a single client call.
///
/// `Timeout` is recoverable (the caller may retry); `Transport` means the
/// connection needs attention first; `Decode` indicates schema mismatch or
/// corruption and must not be retried; `Service` is the handler's own
/// structured error.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("call to {method:?} timed out after {elapsed:?}")]
    Timeout { method: String, elapsed: Duration },
    #[error(transparent)]
    Transport(TransportError),
    #[error(transparent)]
    Decode(DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Service(ServiceError),
    #[error(transparent)]
    Subject(#[from] SubjectError),
}

/// One callable endpoint as seen from the client side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEndpoint {
    pub name: String,
    pub subject: String,
}

/// Typed client for one service, bound to an explicit transport handle.
pub struct ServiceClient {
    transport: Arc<dyn Transport>,
    ident: ServiceIdent,
    config: RuntimeConfig,
    endpoints: Vec<ClientEndpoint>,
}

impl ServiceClient {
    /// Builds a client for the given service and its declared methods.
    ///
    /// Subjects for every method are derived eagerly, so a bad method name
    /// fails construction rather than the first call.
    ///
    /// # Errors
    ///
    /// Returns [`SubjectError`] for an invalid method token.
    pub fn new(
        transport: Arc<dyn Transport>,
        ident: ServiceIdent,
        config: RuntimeConfig,
        methods: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, SubjectError> {
        let mut endpoints = Vec::new();
        for method in methods {
            let name = method.into();
            let subject = ident.subject(&name)?;
            endpoints.push(ClientEndpoint { name, subject });
        }
        Ok(Self {
            transport,
            ident,
            config,
            endpoints,
        })
    }

    /// Endpoints this client was built with, declaration order.
    #[must_use]
    pub fn endpoints(&self) -> &[ClientEndpoint] {
        &self.endpoints
    }

    /// Calls a method and returns the typed response plus its headers.
    ///
    /// `timeout` defaults to the configured call timeout. A zero timeout
    /// expires immediately, which the transport honors deterministically.
    ///
    /// # Errors
    ///
    /// See [`CallError`] for the full taxonomy. No retries happen here.
    pub async fn call<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        mut headers: Headers,
        timeout: Option<Duration>,
    ) -> Result<(Resp, Headers), CallError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let subject = match self.endpoints.iter().find(|e| e.name == method) {
            Some(endpoint) => endpoint.subject.clone(),
            None => self.ident.subject(method)?,
        };
        let timeout = timeout.unwrap_or(self.config.default_call_timeout);

        // Propagate the deadline so the server can stop working on a call
        // the client has already given up on.
        if !timeout.is_zero() {
            if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
                let deadline_ms = now.as_millis().saturating_add(timeout.as_millis());
                headers.insert(reserved::DEADLINE_MS, deadline_ms.to_string());
            }
        }

        let envelope = codec::encode(request, headers, self.config.max_payload_bytes)?;
        let start = Instant::now();
        tracing::debug!(service = %self.ident, method, %subject, "issuing call");

        let reply = self
            .transport
            .request(&subject, envelope, timeout)
            .await
            .map_err(|err| match err {
                TransportError::Timeout { .. } => CallError::Timeout {
                    method: method.to_string(),
                    elapsed: start.elapsed(),
                },
                other => CallError::Transport(other),
            })?;

        codec::decode(&reply).map_err(|err| match err {
            DecodeError::ErrorEnvelope(service_err) => CallError::Service(service_err),
            malformed => CallError::Decode(malformed),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
