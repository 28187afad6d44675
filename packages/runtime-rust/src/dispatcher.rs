//! The dispatch loops: bridge inbound broker messages to endpoint handlers.
//!
//! One loop per endpoint subject. Every inbound message becomes an
//! independent task, so handlers for the same endpoint run concurrently and
//! a failing invocation can never affect another in-flight call or the
//! loop's liveness.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tower::Service;
use wirebus_core::envelope::reserved;
use wirebus_core::{Envelope, Headers};

use crate::handler::{BoxEndpoint, RequestContext, RpcRequest};
use crate::lifecycle::{LifecycleController, ServiceState};
use crate::stats::EndpointStats;
use crate::transport::{InboundMessage, Subscription, Transport};

/// A registered endpoint: method name, derived subject, and the pipeline
/// that decodes, guards, and invokes its handler.
///
/// The pipeline is behind a mutex only for the synchronous `call()` that
/// constructs each invocation future; the futures themselves run
/// unlocked and concurrently.
pub(crate) struct EndpointRuntime {
    pub name: String,
    pub subject: String,
    pub pipeline: Mutex<BoxEndpoint>,
    pub stats: Arc<EndpointStats>,
}

/// Spawns and owns the per-endpoint dispatch loops.
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    lifecycle: Arc<LifecycleController>,
}

impl Dispatcher {
    pub(crate) fn new(transport: Arc<dyn Transport>, lifecycle: Arc<LifecycleController>) -> Self {
        Self {
            transport,
            lifecycle,
        }
    }

    /// Runs one endpoint's dispatch loop until stop is signalled or the
    /// transport closes the subscription.
    pub(crate) fn spawn_endpoint_loop(
        &self,
        endpoint: Arc<EndpointRuntime>,
        mut subscription: Subscription,
    ) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let lifecycle = Arc::clone(&self.lifecycle);

        tokio::spawn(async move {
            let mut stop_rx = lifecycle.stop_receiver();
            loop {
                tokio::select! {
                    msg = subscription.recv() => {
                        let Some(msg) = msg else { break };
                        match lifecycle.state() {
                            ServiceState::Stopping | ServiceState::Stopped => {
                                tracing::debug!(
                                    endpoint = %endpoint.name,
                                    "rejecting inbound message while stopping"
                                );
                            }
                            ServiceState::Starting | ServiceState::Running => {
                                dispatch_one(&transport, &lifecycle, &endpoint, msg);
                            }
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::debug!(endpoint = %endpoint.name, "dispatch loop exited");
        })
    }
}

/// Converts the caller-stamped `Deadline-Ms` header (unix-epoch millis)
/// into a monotonic deadline for the middleware.
fn parse_deadline(headers: &Headers) -> Option<Instant> {
    let deadline_ms: u64 = headers.get(reserved::DEADLINE_MS)?.parse().ok()?;
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_millis();
    let remaining = u128::from(deadline_ms).saturating_sub(now_ms);
    #[allow(clippy::cast_possible_truncation)]
    Some(Instant::now() + Duration::from_millis(remaining as u64))
}

/// Dispatches one inbound message as an independent task.
///
/// The invocation future is built synchronously (so the in-flight guard is
/// held before the loop moves on) and awaited in its own task. A handler
/// panic kills only that task; the guard unwinds with it.
fn dispatch_one(
    transport: &Arc<dyn Transport>,
    lifecycle: &Arc<LifecycleController>,
    endpoint: &Arc<EndpointRuntime>,
    msg: InboundMessage,
) {
    let deadline = parse_deadline(&msg.envelope.headers);
    let context = RequestContext::new(msg.envelope.headers.clone(), deadline);
    let request = RpcRequest {
        envelope: msg.envelope,
        context,
    };

    let guard = lifecycle.in_flight_guard();
    let fut = endpoint.pipeline.lock().call(request);

    let transport = Arc::clone(transport);
    let lifecycle = Arc::clone(lifecycle);
    let endpoint = Arc::clone(endpoint);
    tokio::spawn(async move {
        let _guard = guard;
        let result = fut.await;

        let Some(reply_subject) = msg.reply else {
            // Fire-and-forget: the handler ran for its side effects.
            tracing::debug!(endpoint = %endpoint.name, "no reply subject, result discarded");
            return;
        };

        // A handler that outlived the drain grace period is abandoned.
        if lifecycle.state() == ServiceState::Stopped {
            tracing::debug!(endpoint = %endpoint.name, "service stopped, late reply discarded");
            return;
        }

        let reply = match result {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(endpoint = %endpoint.name, error = %err, "handler failed");
                Envelope::error(&err.to_service_error())
            }
        };
        if let Err(err) = transport.publish(&reply_subject, reply).await {
            tracing::warn!(
                endpoint = %endpoint.name,
                error = %err,
                "failed to publish reply"
            );
        }
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
