//! Stats middleware: records per-endpoint counters and emits a `tracing`
//! span per dispatch.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use wirebus_core::Envelope;

use crate::handler::{BoxFuture, DispatchError, RpcRequest};
use crate::stats::EndpointStats;

/// Tower layer recording dispatch timing and outcome into [`EndpointStats`].
#[derive(Debug, Clone)]
pub struct StatsLayer {
    endpoint: String,
    stats: Arc<EndpointStats>,
}

impl StatsLayer {
    /// Creates a layer bound to one endpoint's counters.
    #[must_use]
    pub fn new(endpoint: String, stats: Arc<EndpointStats>) -> Self {
        Self { endpoint, stats }
    }
}

impl<S> Layer<S> for StatsLayer {
    type Service = StatsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatsService {
            inner,
            endpoint: self.endpoint.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

/// Service wrapper produced by [`StatsLayer`].
#[derive(Debug, Clone)]
pub struct StatsService<S> {
    inner: S,
    endpoint: String,
    stats: Arc<EndpointStats>,
}

impl<S> Service<RpcRequest> for StatsService<S>
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
        let endpoint = self.endpoint.clone();
        let stats = Arc::clone(&self.stats);
        let span = info_span!(
            "dispatch",
            endpoint = %endpoint,
            duration_us = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = if result.is_ok() { "ok" } else { "error" };

                stats.record(elapsed, result.is_err());
                #[allow(clippy::cast_possible_truncation)]
                let duration_us = elapsed.as_micros() as u64;
                tracing::Span::current().record("duration_us", duration_us);
                tracing::Span::current().record("outcome", outcome);
                tracing::debug!(endpoint = %endpoint, outcome, "dispatch complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use wirebus_core::codec::{self, DEFAULT_MAX_PAYLOAD};
    use wirebus_core::Headers;

    use super::*;
    use crate::handler::{endpoint_service, HandlerError, Reply, RequestContext};

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Noop {}

    fn make_request() -> RpcRequest {
        RpcRequest {
            envelope: codec::encode(&Noop {}, Headers::new(), DEFAULT_MAX_PAYLOAD).unwrap(),
            context: RequestContext::new(Headers::new(), None),
        }
    }

    #[tokio::test]
    async fn records_successes_and_errors_separately() {
        let stats = Arc::new(EndpointStats::default());

        let ok_endpoint = endpoint_service::<Noop, Noop, _, _>(
            |req: Noop, _ctx| async move { Ok(Reply::new(req)) },
            DEFAULT_MAX_PAYLOAD,
        );
        let mut svc = StatsLayer::new("noop".to_string(), stats.clone()).layer(ok_endpoint);
        svc.call(make_request()).await.unwrap();

        let failing = endpoint_service::<Noop, Noop, _, _>(
            |_req: Noop, _ctx| async move {
                Err::<Reply<Noop>, _>(HandlerError::new("500", "boom"))
            },
            DEFAULT_MAX_PAYLOAD,
        );
        let mut svc = StatsLayer::new("noop".to_string(), stats.clone()).layer(failing);
        svc.call(make_request()).await.unwrap_err();

        let snap = stats.snapshot();
        assert_eq!(snap.num_requests, 2);
        assert_eq!(snap.num_errors, 1);
    }
}
