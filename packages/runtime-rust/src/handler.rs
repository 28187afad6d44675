//! Handler-side types: request context, handler errors, and the adapter
//! that turns a typed async function into a dispatchable endpoint service.
//!
//! Dynamic method dispatch is plain type erasure: each typed handler is
//! bound to its method name at registration time as a boxed
//! `tower::Service`, the same way domain services are erased into the
//! routing table elsewhere in this crate. No runtime reflection.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tower::Service;
use wirebus_core::error::codes;
use wirebus_core::{codec, DecodeError, EncodeError, Envelope, Headers, ServiceError};

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

/// Per-invocation context passed to every handler. Never outlives the call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request headers, exactly as the caller set them.
    pub headers: Headers,
    /// Deadline propagated by the caller, if any.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Builds a context from inbound headers and an optional deadline.
    #[must_use]
    pub fn new(headers: Headers, deadline: Option<Instant>) -> Self {
        Self { headers, deadline }
    }
}

// ---------------------------------------------------------------------------
// HandlerError / Reply
// ---------------------------------------------------------------------------

/// Application-level failure returned by a handler.
///
/// Converted into a structured error envelope by the dispatcher; it never
/// crashes the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handler error {code}: {message}")]
pub struct HandlerError {
    pub code: String,
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error with an application-chosen code.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(codes::INTERNAL, err.to_string())
    }
}

/// A successful handler outcome: the response message plus any headers the
/// handler wants surfaced to the caller (none by default).
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub message: T,
    pub headers: Headers,
}

impl<T> Reply<T> {
    /// Reply with no response headers.
    #[must_use]
    pub fn new(message: T) -> Self {
        Self {
            message,
            headers: Headers::new(),
        }
    }

    /// Adds a response header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }
}

// ---------------------------------------------------------------------------
// Dispatch pipeline types
// ---------------------------------------------------------------------------

/// One inbound call travelling through the endpoint pipeline.
#[derive(Debug)]
pub struct RpcRequest {
    pub envelope: Envelope,
    pub context: RequestContext,
}

/// Failure inside the endpoint pipeline, converted into an error envelope
/// at the dispatch boundary.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("request decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("response encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Handler(HandlerError),
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl DispatchError {
    /// Maps the failure onto the structured error envelope the caller sees.
    #[must_use]
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            Self::Decode(err) => ServiceError::new(codes::BAD_REQUEST, err.to_string()),
            Self::Encode(err) => ServiceError::new(codes::INTERNAL, err.to_string()),
            Self::Handler(err) => ServiceError::new(err.code.clone(), err.message.clone()),
            Self::DeadlineExceeded => {
                ServiceError::new(codes::DEADLINE_EXCEEDED, self.to_string())
            }
        }
    }
}

/// Boxed future produced by endpoint services.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<Envelope, DispatchError>> + Send>>;

/// A type-erased endpoint: decode request, run handler, encode reply.
pub type BoxEndpoint =
    Box<dyn Service<RpcRequest, Response = Envelope, Error = DispatchError, Future = BoxFuture> + Send>;

// ---------------------------------------------------------------------------
// Typed endpoint adapter
// ---------------------------------------------------------------------------

/// Adapts a typed async handler function into an endpoint service.
struct TypedEndpoint<Req, Resp, F> {
    handler: F,
    max_payload: usize,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F, Fut> Service<RpcRequest> for TypedEndpoint<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req, RequestContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Reply<Resp>, HandlerError>> + Send + 'static,
{
    type Response = Envelope;
    type Error = DispatchError;
    type Future = BoxFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RpcRequest) -> Self::Future {
        let handler = self.handler.clone();
        let max_payload = self.max_payload;
        Box::pin(async move {
            let (request, _headers) = codec::decode::<Req>(&req.envelope)?;
            let reply = handler(request, req.context)
                .await
                .map_err(DispatchError::Handler)?;
            Ok(codec::encode(&reply.message, reply.headers, max_payload)?)
        })
    }
}

/// Binds a typed handler function into a boxed endpoint service.
pub fn endpoint_service<Req, Resp, F, Fut>(handler: F, max_payload: usize) -> BoxEndpoint
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req, RequestContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Reply<Resp>, HandlerError>> + Send + 'static,
{
    Box::new(TypedEndpoint {
        handler,
        max_payload,
        _marker: PhantomData,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
