//! Wirebus runtime — service hosting and client stubs over a message bus.

pub mod client;
pub mod config;
pub(crate) mod dispatcher;
pub mod handler;
pub mod lifecycle;
pub mod middleware;
pub mod service;
pub mod stats;
pub mod transport;

pub use client::{CallError, ClientEndpoint, ServiceClient};
pub use config::RuntimeConfig;
pub use handler::{HandlerError, Reply, RequestContext};
pub use lifecycle::ServiceState;
pub use service::{EndpointInfo, RegisterError, Service, ServiceBuilder, ServiceInfo};
pub use stats::EndpointStatsSnapshot;
pub use transport::{MemoryBus, Transport, TransportError};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use wirebus_core::{Headers, ServiceIdent};

    use super::*;
    use crate::handler::HandlerError;

    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    // -----------------------------------------------------------------------
    // End-to-end: client stub against a registered service over the in-process
    // bus.
    // -----------------------------------------------------------------------

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct EchoRequest {
        message: String,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct EchoResponse {
        message: String,
        timestamp: u64,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct GreetingRequest {
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct GreetingResponse {
        greeting: String,
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    async fn start_example_service(bus: Arc<MemoryBus>) -> Service {
        service::ServiceBuilder::new(ServiceIdent::new("example_service", "1.0.0").unwrap())
            .endpoint::<EchoRequest, EchoResponse, _, _>("echo", |req, ctx| async move {
                let mut reply = handler::Reply::new(EchoResponse {
                    message: req.message,
                    timestamp: now_secs(),
                });
                // Reflect the caller's user header so propagation is
                // observable end to end.
                if let Some(user) = ctx.headers.get("X-User-ID") {
                    reply = reply.with_header("X-User-ID", user);
                }
                if ctx.deadline.is_some() {
                    reply = reply.with_header("X-Saw-Deadline", "1");
                }
                Ok(reply)
            })
            .endpoint::<GreetingRequest, GreetingResponse, _, _>(
                "get_greeting",
                |req, _ctx| async move {
                    if req.name.is_empty() {
                        return Err(HandlerError::new("400", "name must not be empty"));
                    }
                    Ok(handler::Reply::new(GreetingResponse {
                        greeting: format!("Hello, {}!", req.name),
                    }))
                },
            )
            .register(bus, RuntimeConfig::default())
            .await
            .unwrap()
    }

    fn example_client(bus: Arc<MemoryBus>) -> ServiceClient {
        ServiceClient::new(
            bus,
            ServiceIdent::new("example_service", "1.0.0").unwrap(),
            RuntimeConfig::default(),
            ["echo", "get_greeting"],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn echo_round_trip_with_header_propagation() {
        init_tracing();
        let bus = Arc::new(MemoryBus::connect(&RuntimeConfig::default()));
        let service = start_example_service(bus.clone()).await;
        let client = example_client(bus);

        let mut headers = Headers::new();
        headers.insert("X-User-ID", "12345");
        let before = now_secs();
        let (response, reply_headers) = client
            .call::<_, EchoResponse>(
                "echo",
                &EchoRequest {
                    message: "hello".into(),
                },
                headers,
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.message, "hello");
        // The handler stamped its timestamp after the request was issued.
        assert!(response.timestamp >= before);
        assert_eq!(reply_headers.get("X-User-ID"), Some("12345"));
        // The client stamped a deadline and the handler observed it.
        assert_eq!(reply_headers.get("X-Saw-Deadline"), Some("1"));

        service.stop().await;
    }

    #[tokio::test]
    async fn handler_error_surfaces_to_the_caller() {
        let bus = Arc::new(MemoryBus::connect(&RuntimeConfig::default()));
        let service = start_example_service(bus.clone()).await;
        let client = example_client(bus);

        let err = client
            .call::<_, GreetingResponse>(
                "get_greeting",
                &GreetingRequest { name: String::new() },
                Headers::new(),
                None,
            )
            .await
            .unwrap_err();

        match err {
            CallError::Service(service_err) => {
                assert_eq!(service_err.code, "400");
                assert_eq!(service_err.message, "name must not be empty");
            }
            other => panic!("expected service error, got {other:?}"),
        }

        service.stop().await;
    }

    #[tokio::test]
    async fn one_failing_call_does_not_disturb_others() {
        let bus = Arc::new(MemoryBus::connect(&RuntimeConfig::default()));
        let service = start_example_service(bus.clone()).await;
        let client = Arc::new(example_client(bus));

        let failing = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .call::<_, GreetingResponse>(
                        "get_greeting",
                        &GreetingRequest { name: String::new() },
                        Headers::new(),
                        None,
                    )
                    .await
            })
        };
        let succeeding = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .call::<_, GreetingResponse>(
                        "get_greeting",
                        &GreetingRequest { name: "Ada".into() },
                        Headers::new(),
                        None,
                    )
                    .await
            })
        };

        assert!(matches!(
            failing.await.unwrap(),
            Err(CallError::Service(_))
        ));
        let (response, _) = succeeding.await.unwrap().unwrap();
        assert_eq!(response.greeting, "Hello, Ada!");

        service.stop().await;
    }

    #[tokio::test]
    async fn stats_track_requests_and_errors() {
        let bus = Arc::new(MemoryBus::connect(&RuntimeConfig::default()));
        let service = start_example_service(bus.clone()).await;
        let client = example_client(bus);

        let _ = client
            .call::<_, GreetingResponse>(
                "get_greeting",
                &GreetingRequest { name: "Ada".into() },
                Headers::new(),
                None,
            )
            .await
            .unwrap();
        let _ = client
            .call::<_, GreetingResponse>(
                "get_greeting",
                &GreetingRequest { name: String::new() },
                Headers::new(),
                None,
            )
            .await
            .unwrap_err();

        let info = service.info();
        let greeting = info
            .endpoints
            .iter()
            .find(|e| e.name == "get_greeting")
            .unwrap();
        assert_eq!(greeting.stats.num_requests, 2);
        assert_eq!(greeting.stats.num_errors, 1);

        let echo = info.endpoints.iter().find(|e| e.name == "echo").unwrap();
        assert_eq!(echo.stats.num_requests, 0);

        service.stop().await;
    }

    #[tokio::test]
    async fn stopped_service_no_longer_answers() {
        let bus = Arc::new(MemoryBus::connect(&RuntimeConfig::default()));
        let service = start_example_service(bus.clone()).await;
        let client = example_client(bus);

        service.stop().await;
        assert_eq!(service.state(), ServiceState::Stopped);

        let err = client
            .call::<_, EchoResponse>(
                "echo",
                &EchoRequest {
                    message: "late".into(),
                },
                Headers::new(),
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. }));
    }

    #[tokio::test]
    async fn two_service_instances_both_receive_traffic() {
        // Two registrations of the same subjects both subscribe; a single
        // request resolves exactly one reply for the caller.
        let bus = Arc::new(MemoryBus::connect(&RuntimeConfig::default()));
        let a = start_example_service(bus.clone()).await;
        let b = start_example_service(bus.clone()).await;
        let client = example_client(bus);

        let (response, _) = client
            .call::<_, EchoResponse>(
                "echo",
                &EchoRequest {
                    message: "fanout".into(),
                },
                Headers::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(response.message, "fanout");

        a.stop().await;
        b.stop().await;
    }
}
