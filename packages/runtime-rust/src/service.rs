//! Service registration, introspection, and stop.
//!
//! `ServiceBuilder` binds typed handler functions to method names in
//! declaration order; `register()` derives every subject, subscribes them
//! all (any failure is a construction-time error, never a later state
//! change), then starts the dispatch loops and transitions to `Running`.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use wirebus_core::{ServiceIdent, SubjectError};

use crate::config::RuntimeConfig;
use crate::dispatcher::{Dispatcher, EndpointRuntime};
use crate::handler::{endpoint_service, BoxEndpoint, HandlerError, Reply, RequestContext};
use crate::lifecycle::{LifecycleController, ServiceState};
use crate::middleware::build_endpoint_pipeline;
use crate::stats::{EndpointStats, EndpointStatsSnapshot};
use crate::transport::{Transport, TransportError};

/// Failure to register a service. Always surfaces at construction time.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("duplicate endpoint {name:?}")]
    DuplicateEndpoint { name: String },
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

type EndpointFactory = Box<dyn FnOnce(usize) -> BoxEndpoint + Send>;

/// Declares a service's endpoints before registration.
pub struct ServiceBuilder {
    ident: ServiceIdent,
    endpoints: Vec<(String, EndpointFactory)>,
}

impl ServiceBuilder {
    /// Starts a builder for the given service identity.
    #[must_use]
    pub fn new(ident: ServiceIdent) -> Self {
        Self {
            ident,
            endpoints: Vec::new(),
        }
    }

    /// Binds a typed handler function to a method name.
    ///
    /// Declaration order becomes the stable order reported by
    /// [`Service::endpoints`].
    #[must_use]
    pub fn endpoint<Req, Resp, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req, RequestContext) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<Reply<Resp>, HandlerError>> + Send + 'static,
    {
        self.endpoints.push((
            name.into(),
            Box::new(move |max_payload| endpoint_service(handler, max_payload)),
        ));
        self
    }

    /// Registers the service: derives subjects, subscribes every endpoint,
    /// and starts dispatching.
    ///
    /// # Errors
    ///
    /// Fails on duplicate endpoint names, invalid method tokens, or any
    /// subscription failure. Nothing dispatches on failure.
    pub async fn register(
        self,
        transport: Arc<dyn Transport>,
        config: RuntimeConfig,
    ) -> Result<Service, RegisterError> {
        let ident = self.ident;

        let mut runtimes: Vec<Arc<EndpointRuntime>> = Vec::with_capacity(self.endpoints.len());
        for (name, factory) in self.endpoints {
            if runtimes.iter().any(|r| r.name == name) {
                return Err(RegisterError::DuplicateEndpoint { name });
            }
            let subject = ident.subject(&name)?;
            let stats = Arc::new(EndpointStats::default());
            let pipeline = build_endpoint_pipeline(
                factory(config.max_payload_bytes),
                name.clone(),
                Arc::clone(&stats),
            );
            runtimes.push(Arc::new(EndpointRuntime {
                name,
                subject,
                pipeline: Mutex::new(pipeline),
                stats,
            }));
        }

        // Subscribe everything up front so a partial failure aborts
        // registration before a single message is dispatched.
        let mut subscriptions = Vec::with_capacity(runtimes.len());
        for runtime in &runtimes {
            subscriptions.push(transport.subscribe(&runtime.subject).await?);
        }

        let lifecycle = Arc::new(LifecycleController::new());
        let dispatcher = Dispatcher::new(Arc::clone(&transport), Arc::clone(&lifecycle));

        let mut tasks = Vec::with_capacity(runtimes.len());
        let mut endpoints = Vec::with_capacity(runtimes.len());
        for (runtime, subscription) in runtimes.into_iter().zip(subscriptions) {
            tasks.push(dispatcher.spawn_endpoint_loop(Arc::clone(&runtime), subscription));
            endpoints.push(runtime);
        }
        lifecycle.set_running();

        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            service = %ident,
            id = %id,
            endpoints = endpoints.len(),
            "service registered"
        );

        Ok(Service {
            id,
            ident,
            config,
            lifecycle,
            endpoints,
            tasks,
        })
    }
}

/// Introspection data for one endpoint, including live counters.
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub name: String,
    pub subject: String,
    pub stats: EndpointStatsSnapshot,
}

/// Snapshot of a running service instance.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Unique per process instance, assigned at registration.
    pub id: String,
    pub name: String,
    pub version: String,
    pub state: ServiceState,
    /// Endpoints in registration order.
    pub endpoints: Vec<EndpointInfo>,
}

/// A registered, running service instance.
///
/// Owned exclusively by the process that registered it; dropping it aborts
/// the dispatch loops, though `stop()` is the graceful path.
pub struct Service {
    id: String,
    ident: ServiceIdent,
    config: RuntimeConfig,
    lifecycle: Arc<LifecycleController>,
    endpoints: Vec<Arc<EndpointRuntime>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Unique instance id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    /// Registered method names, in registration order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.name.clone()).collect()
    }

    /// Full introspection snapshot with live per-endpoint stats.
    #[must_use]
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            id: self.id.clone(),
            name: self.ident.name().to_string(),
            version: self.ident.version().to_string(),
            state: self.lifecycle.state(),
            endpoints: self
                .endpoints
                .iter()
                .map(|e| EndpointInfo {
                    name: e.name.clone(),
                    subject: e.subject.clone(),
                    stats: e.stats.snapshot(),
                })
                .collect(),
        }
    }

    /// Stops the service: no new messages are accepted, in-flight handlers
    /// get up to the configured drain grace period, then the instance is
    /// `Stopped` regardless. Idempotent.
    pub async fn stop(&self) {
        match self.lifecycle.state() {
            ServiceState::Stopping | ServiceState::Stopped => return,
            ServiceState::Starting | ServiceState::Running => {}
        }

        self.lifecycle.trigger_stop();
        let drained = self.lifecycle.wait_for_drain(self.config.drain_grace).await;
        if !drained {
            tracing::warn!(
                service = %self.ident,
                in_flight = self.lifecycle.in_flight_count(),
                "drain grace expired, abandoning in-flight handlers"
            );
        }
        self.lifecycle.mark_stopped();
        tracing::info!(service = %self.ident, id = %self.id, "service stopped");
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBus;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Noop {}

    fn ident() -> ServiceIdent {
        ServiceIdent::new("example_service", "1.0.0").unwrap()
    }

    fn noop_builder() -> ServiceBuilder {
        ServiceBuilder::new(ident())
            .endpoint::<Noop, Noop, _, _>("echo", |req, _ctx| async move { Ok(Reply::new(req)) })
            .endpoint::<Noop, Noop, _, _>("get_greeting", |req, _ctx| async move {
                Ok(Reply::new(req))
            })
    }

    #[tokio::test]
    async fn endpoints_in_registration_order() {
        let bus = MemoryBus::connect(&RuntimeConfig::default());
        let service = noop_builder()
            .register(Arc::new(bus), RuntimeConfig::default())
            .await
            .unwrap();

        assert_eq!(service.endpoints(), vec!["echo", "get_greeting"]);
        assert_eq!(service.state(), ServiceState::Running);
    }

    #[tokio::test]
    async fn info_reports_identity_and_subjects() {
        let bus = MemoryBus::connect(&RuntimeConfig::default());
        let service = noop_builder()
            .register(Arc::new(bus), RuntimeConfig::default())
            .await
            .unwrap();

        let info = service.info();
        assert!(!info.id.is_empty());
        assert_eq!(info.name, "example_service");
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.state, ServiceState::Running);
        assert_eq!(info.endpoints.len(), 2);
        assert_eq!(info.endpoints[0].subject, "example_service.1.0.0.echo");
        assert_eq!(info.endpoints[0].stats.num_requests, 0);
    }

    #[tokio::test]
    async fn instance_ids_are_unique() {
        let bus = Arc::new(MemoryBus::connect(&RuntimeConfig::default()));
        let a = noop_builder()
            .register(bus.clone(), RuntimeConfig::default())
            .await
            .unwrap();
        let b = noop_builder()
            .register(bus, RuntimeConfig::default())
            .await
            .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn duplicate_endpoint_rejected() {
        let bus = MemoryBus::connect(&RuntimeConfig::default());
        let result = ServiceBuilder::new(ident())
            .endpoint::<Noop, Noop, _, _>("echo", |req, _ctx| async move { Ok(Reply::new(req)) })
            .endpoint::<Noop, Noop, _, _>("echo", |req, _ctx| async move { Ok(Reply::new(req)) })
            .register(Arc::new(bus), RuntimeConfig::default())
            .await;

        assert!(matches!(
            result,
            Err(RegisterError::DuplicateEndpoint { name }) if name == "echo"
        ));
    }

    #[tokio::test]
    async fn invalid_method_name_fails_registration() {
        let bus = MemoryBus::connect(&RuntimeConfig::default());
        let result = ServiceBuilder::new(ident())
            .endpoint::<Noop, Noop, _, _>("bad method", |req, _ctx| async move {
                Ok(Reply::new(req))
            })
            .register(Arc::new(bus), RuntimeConfig::default())
            .await;

        assert!(matches!(result, Err(RegisterError::Subject(_))));
    }

    #[tokio::test]
    async fn closed_transport_fails_registration() {
        let bus = MemoryBus::connect(&RuntimeConfig::default());
        bus.close();
        let result = noop_builder()
            .register(Arc::new(bus), RuntimeConfig::default())
            .await;

        assert!(matches!(
            result,
            Err(RegisterError::Transport(TransportError::Closed))
        ));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_terminal() {
        let bus = MemoryBus::connect(&RuntimeConfig::default());
        let service = noop_builder()
            .register(Arc::new(bus), RuntimeConfig::default())
            .await
            .unwrap();

        service.stop().await;
        assert_eq!(service.state(), ServiceState::Stopped);
        service.stop().await;
        assert_eq!(service.state(), ServiceState::Stopped);
    }
}
