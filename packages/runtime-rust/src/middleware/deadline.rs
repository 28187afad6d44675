//! Deadline middleware: rejects or cuts off handlers whose caller-propagated
//! deadline has expired, yielding `DispatchError::DeadlineExceeded` (which
//! reaches the caller as a 408 error envelope).

use std::task::{Context, Poll};

use tokio::time::Instant;
use tower::{Layer, Service};
use wirebus_core::Envelope;

use crate::handler::{BoxFuture, DispatchError, RpcRequest};

/// Tower layer enforcing the per-request deadline from the request context.
#[derive(Debug, Clone)]
pub struct DeadlineLayer;

impl<S> Layer<S> for DeadlineLayer {
    type Service = DeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeadlineService { inner }
    }
}

/// Service wrapper produced by [`DeadlineLayer`].
#[derive(Debug, Clone)]
pub struct DeadlineService<S> {
    inner: S,
}

impl<S> Service<RpcRequest> for DeadlineService<S>
where
    S: Service<RpcRequest, Response = Envelope, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = Envelope;
    type Error = DispatchError;
    type Future = BoxFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RpcRequest) -> Self::Future {
        let deadline = req.context.deadline;

        // An already-expired deadline never reaches the handler.
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Box::pin(async { Err(DispatchError::DeadlineExceeded) });
            }
        }

        let fut = self.inner.call(req);
        Box::pin(async move {
            match deadline {
                Some(d) => match tokio::time::timeout_at(d, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::DeadlineExceeded),
                },
                None => fut.await,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
