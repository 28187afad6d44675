//! Middleware layers wrapped around every endpoint handler.
//!
//! Layer order (outermost to innermost):
//! 1. `StatsLayer` -- counts every dispatch, including deadline rejections
//! 2. `DeadlineLayer` -- enforces the caller-propagated deadline
//! 3. the typed endpoint service itself

use std::sync::Arc;

use tower::ServiceBuilder;

use crate::handler::BoxEndpoint;
use crate::stats::EndpointStats;

mod deadline;
mod stats;

pub use deadline::DeadlineLayer;
pub use stats::StatsLayer;

/// Wraps an endpoint service with the standard middleware stack.
#[must_use]
pub fn build_endpoint_pipeline(
    inner: BoxEndpoint,
    endpoint: String,
    stats: Arc<EndpointStats>,
) -> BoxEndpoint {
    Box::new(
        ServiceBuilder::new()
            .layer(StatsLayer::new(endpoint, stats))
            .layer(DeadlineLayer)
            .service(inner),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
