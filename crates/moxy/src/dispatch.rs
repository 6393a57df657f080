//! Per-request decision between serving a mock and forwarding upstream.
//!
//! 1. Split `/{service_id}/{rest...}` into the service id and the remainder
//! 2. Resolve the service, then the verb
//! 3. Fingerprint (remainder, verb, body) and look the API up
//! 4. Miss: forward if the service is `service-passthrough`, else NotFound
//! 5. Hit: forward if the API is `api-passthrough`, else serve the mock

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;
use tokio::time::Instant;
use tracing::Instrument;

use crate::error::{MoxyError, Result};
use crate::fingerprint;
use crate::mode::ApiMode;
use crate::proxy::ProxyGateway;
use crate::registry::{MockedResponse, Registry, Service};
use crate::stats::DispatchStats;
use crate::verb::Verb;

/// An inbound request as handed over by the HTTP boundary.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_id: String,
    pub method: String,
    /// Path only, without the query string.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Passed through to the gateway on a forward; dispatch itself never
    /// times out.
    pub deadline: Option<Instant>,
}

/// What dispatch decided, with the data needed to answer the client.
#[derive(Debug)]
pub enum Dispatched {
    Mocked {
        response: MockedResponse,
        latency: Option<Duration>,
    },
    Forwarded(Response),
}

/// Split `/{service_id}/{rest}` into `(service_id, "/{rest}")`.
///
/// `/svc.1.0/` yields remainder `/`; `/svc.1.0` has no remainder and is
/// malformed.
pub fn split_path(path: &str) -> Result<(&str, &str)> {
    let malformed = || MoxyError::MalformedPath(path.to_string());
    let rest = path.strip_prefix('/').ok_or_else(malformed)?;
    let slash = rest.find('/').ok_or_else(malformed)?;
    let (service_id, remainder) = rest.split_at(slash);
    if service_id.is_empty() {
        return Err(malformed());
    }
    Ok((service_id, remainder))
}

/// Empty bodies are absent; anything else must be JSON.
fn parse_body(body: &Bytes) -> Result<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(MoxyError::InvalidPayload)
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    gateway: Arc<dyn ProxyGateway>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, gateway: Arc<dyn ProxyGateway>, stats: DispatchStats) -> Self {
        Self {
            registry,
            gateway,
            stats,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub async fn dispatch(&self, request: InboundRequest) -> Result<Dispatched> {
        let span = moxy_tracing::dispatch_span!(&request.request_id, &request.method, &request.path);
        self.stats.inc_dispatched();

        let result = self.decide(request).instrument(span).await;
        match &result {
            Ok(Dispatched::Mocked { .. }) => self.stats.inc_mocked(),
            Ok(Dispatched::Forwarded(_)) => self.stats.inc_forwarded(),
            Err(MoxyError::NotFound(_) | MoxyError::ServiceNotFound(_)) => self.stats.inc_not_found(),
            Err(_) => self.stats.inc_failed(),
        }
        result
    }

    async fn decide(&self, request: InboundRequest) -> Result<Dispatched> {
        let span = tracing::Span::current();
        let (service_id, remainder) = split_path(&request.path)?;
        span.record("service_id", service_id);

        let service = self
            .registry
            .get_service_by_id(service_id)
            .map_err(|_| MoxyError::ServiceNotFound(service_id.to_string()))?;
        let verb: Verb = request.method.parse()?;
        let payload = parse_body(&request.body)?;
        let fp = fingerprint::fingerprint(verb, remainder, payload.as_ref())?;
        let remainder = remainder.to_string();

        tracing::debug!(
            api_id = %fp.digest,
            core_seed = %String::from_utf8_lossy(&fp.core_seed),
            "Resolving API"
        );

        let endpoint = match self.registry.get_api_by_id(&service, &fp.digest) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                if !service.allows_passthrough() {
                    tracing::info!(api_id = %fp.digest, "No mock registered and service does not pass through");
                    return Err(err);
                }
                tracing::info!(remainder = %remainder, "No mock registered, passing through");
                return self.forward(&service, &remainder, request).await;
            }
        };

        let api = endpoint.api();
        span.record("api_id", api.id.as_str());
        match api.invocation_mode {
            ApiMode::ApiPassthrough => {
                tracing::info!(api_id = %api.id, "API configured for pass-through");
                self.forward(&service, &remainder, request).await
            }
            ApiMode::Mock | ApiMode::Validate => {
                if api.invocation_mode == ApiMode::Validate {
                    tracing::debug!(api_id = %api.id, "Validate mode has no dispatch behavior, serving mock");
                }
                span.record("outcome", "mocked");
                Ok(Dispatched::Mocked {
                    response: api.response.clone(),
                    latency: endpoint.latency(),
                })
            }
        }
    }

    async fn forward(&self, service: &Service, remainder: &str, request: InboundRequest) -> Result<Dispatched> {
        let upstream = service.upstream().ok_or_else(|| {
            MoxyError::InvalidConfiguration(format!("service {} has no upstream", service.id))
        })?;
        tracing::Span::current().record("outcome", "forwarded");
        let response = self.gateway.forward(&upstream, remainder, request).await?;
        Ok(Dispatched::Forwarded(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;

    use crate::config::UpstreamConfig;
    use crate::proxy::Upstream;
    use crate::registry::ApiRegistration;

    /// Records every forward and answers 202 "forwarded".
    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl ProxyGateway for RecordingGateway {
        async fn forward(
            &self,
            upstream: &Upstream,
            rewritten_path: &str,
            request: InboundRequest,
        ) -> Result<Response> {
            self.calls.lock().unwrap().push((
                upstream.base_address().to_string(),
                rewritten_path.to_string(),
                request.query,
            ));
            Ok((StatusCode::ACCEPTED, "forwarded").into_response())
        }
    }

    /// Always fails like an unreachable upstream.
    struct TimeoutGateway;

    #[async_trait]
    impl ProxyGateway for TimeoutGateway {
        async fn forward(
            &self,
            upstream: &Upstream,
            _rewritten_path: &str,
            _request: InboundRequest,
        ) -> Result<Response> {
            Err(MoxyError::UpstreamTimeout(upstream.base_address().to_string()))
        }
    }

    fn setup(gateway: Arc<dyn ProxyGateway>) -> Dispatcher {
        let registry = Arc::new(Registry::new(UpstreamConfig::default()));
        Dispatcher::new(registry, gateway, DispatchStats::new())
    }

    fn request(method: &str, path: &str, body: &str) -> InboundRequest {
        InboundRequest {
            request_id: "test".to_string(),
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
            deadline: None,
        }
    }

    fn registration(path: &str, verb: Verb, payload: Option<Value>, mode: Option<&str>) -> ApiRegistration {
        ApiRegistration {
            path: path.to_string(),
            verb,
            payload,
            response: MockedResponse {
                response_code: 201,
                response_payload: json!({"stored": true}),
            },
            mode: mode.map(str::to_string),
        }
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/svc.1.0/hello/world").unwrap(), ("svc.1.0", "/hello/world"));
        assert_eq!(split_path("/svc.1.0/").unwrap(), ("svc.1.0", "/"));
        for bad in ["/svc.1.0", "svc/x", "/", "", "//x"] {
            assert!(
                matches!(split_path(bad), Err(MoxyError::MalformedPath(_))),
                "{bad:?} should be malformed"
            );
        }
    }

    #[tokio::test]
    async fn test_hit_in_mock_mode_returns_stored_response() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = setup(gateway.clone());
        let svc = dispatcher
            .registry()
            .register_service("svc", "1.0", Some("http://upstream:9000"), Some("service-passthrough"))
            .unwrap();
        dispatcher
            .registry()
            .register_api(&svc, registration("/orders", Verb::Post, Some(json!({"b": 1, "a": 2})), None))
            .unwrap();

        let result = dispatcher
            .dispatch(request("POST", "/svc.1.0/orders", r#"{"a": 2, "b": 1}"#))
            .await
            .unwrap();

        match result {
            Dispatched::Mocked { response, latency } => {
                assert_eq!(response.response_code, 201);
                assert_eq!(response.response_payload, json!({"stored": true}));
                assert!(latency.is_none());
            }
            Dispatched::Forwarded(_) => panic!("expected mocked response"),
        }
        assert!(gateway.calls.lock().unwrap().is_empty());
        assert_eq!(dispatcher.stats().snapshot().mocked, 1);
    }

    #[tokio::test]
    async fn test_hit_in_api_passthrough_is_forwarded() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = setup(gateway.clone());
        let svc = dispatcher
            .registry()
            .register_service("svc", "1.0", Some("http://upstream:9000"), None)
            .unwrap();
        dispatcher
            .registry()
            .register_api(&svc, registration("/live", Verb::Get, None, Some("api-passthrough")))
            .unwrap();

        let result = dispatcher.dispatch(request("GET", "/svc.1.0/live", "")).await.unwrap();

        let Dispatched::Forwarded(response) = result else {
            panic!("expected forwarded response");
        };
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://upstream:9000");
        assert_eq!(calls[0].1, "/live");
    }

    #[tokio::test]
    async fn test_miss_forwarded_under_service_passthrough() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = setup(gateway.clone());
        dispatcher
            .registry()
            .register_service("svc", "1.0", Some("http://upstream:9000/"), Some("service-passthrough"))
            .unwrap();

        let mut req = request("DELETE", "/svc.1.0/users/7", "");
        req.query = Some("force=true".to_string());
        let result = dispatcher.dispatch(req).await.unwrap();

        assert!(matches!(result, Dispatched::Forwarded(_)));
        let calls = gateway.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            (
                "http://upstream:9000".to_string(),
                "/users/7".to_string(),
                Some("force=true".to_string())
            )
        );
        assert_eq!(dispatcher.stats().snapshot().forwarded, 1);
    }

    #[tokio::test]
    async fn test_miss_under_mock_service_is_not_found() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = setup(gateway.clone());
        dispatcher
            .registry()
            .register_service("svc", "1.0", Some("http://upstream:9000"), None)
            .unwrap();

        let err = dispatcher
            .dispatch(request("DELETE", "/svc.1.0/users/7", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, MoxyError::NotFound(_)));
        assert!(gateway.calls.lock().unwrap().is_empty());
        assert_eq!(dispatcher.stats().snapshot().not_found, 1);
    }

    #[tokio::test]
    async fn test_payload_participates_in_matching() {
        let dispatcher = setup(Arc::new(RecordingGateway::default()));
        let svc = dispatcher.registry().register_service("svc", "1.0", None, None).unwrap();
        dispatcher
            .registry()
            .register_api(&svc, registration("/q", Verb::Post, Some(json!({"id": 1})), None))
            .unwrap();

        assert!(dispatcher.dispatch(request("POST", "/svc.1.0/q", r#"{"id":1}"#)).await.is_ok());
        assert!(matches!(
            dispatcher.dispatch(request("POST", "/svc.1.0/q", r#"{"id":2}"#)).await,
            Err(MoxyError::NotFound(_))
        ));
        assert!(matches!(
            dispatcher.dispatch(request("POST", "/svc.1.0/q", "")).await,
            Err(MoxyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_mode_serves_stored_response() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = setup(gateway.clone());
        let svc = dispatcher
            .registry()
            .register_service("svc", "1.0", Some("http://upstream:9000"), None)
            .unwrap();
        dispatcher
            .registry()
            .register_api(&svc, registration("/v", Verb::Get, None, Some("validate")))
            .unwrap();

        let result = dispatcher.dispatch(request("GET", "/svc.1.0/v", "")).await.unwrap();
        assert!(matches!(result, Dispatched::Mocked { .. }));
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latency_is_reported_not_applied() {
        let dispatcher = setup(Arc::new(RecordingGateway::default()));
        let svc = dispatcher.registry().register_service("svc", "1.0", None, None).unwrap();
        dispatcher
            .registry()
            .register_api_with_latency(
                &svc,
                registration("/slow", Verb::Get, None, None),
                Duration::from_secs(30),
            )
            .unwrap();

        let result = dispatcher.dispatch(request("GET", "/svc.1.0/slow", "")).await.unwrap();
        let Dispatched::Mocked { latency, .. } = result else {
            panic!("expected mocked response");
        };
        assert_eq!(latency, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_request_errors() {
        let dispatcher = setup(Arc::new(RecordingGateway::default()));
        dispatcher.registry().register_service("svc", "1.0", None, None).unwrap();

        assert!(matches!(
            dispatcher.dispatch(request("GET", "/svc.1.0", "")).await,
            Err(MoxyError::MalformedPath(_))
        ));
        assert!(matches!(
            dispatcher.dispatch(request("GET", "/nope.1.0/x", "")).await,
            Err(MoxyError::ServiceNotFound(id)) if id == "nope.1.0"
        ));
        assert!(matches!(
            dispatcher.dispatch(request("PATCH", "/svc.1.0/x", "")).await,
            Err(MoxyError::UnsupportedVerb(_))
        ));
        assert!(matches!(
            dispatcher.dispatch(request("POST", "/svc.1.0/x", "{not json")).await,
            Err(MoxyError::InvalidPayload(_))
        ));

        let snapshot = dispatcher.stats().snapshot();
        assert_eq!(snapshot.dispatched, 4);
        assert_eq!(snapshot.not_found, 1);
        assert_eq!(snapshot.failed, 3);
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let dispatcher = setup(Arc::new(TimeoutGateway));
        dispatcher
            .registry()
            .register_service("svc", "1.0", Some("http://upstream:9000"), Some("service-passthrough"))
            .unwrap();

        let err = dispatcher.dispatch(request("GET", "/svc.1.0/x", "")).await.unwrap_err();
        assert!(matches!(err, MoxyError::UpstreamTimeout(u) if u == "http://upstream:9000"));
    }
}
