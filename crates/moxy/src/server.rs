//! Axum HTTP server: admin routes, dispatch fallback, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;

use crate::config::MoxyConfig;
use crate::dispatch::{Dispatched, Dispatcher, InboundRequest};
use crate::error::{MoxyError, Result};
use crate::proxy::correlation;
use crate::registry::{ApiRegistration, MockedResponse, Registry};
use crate::verb::Verb;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: MoxyConfig,
    pub dispatcher: Dispatcher,
}

impl AppState {
    fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }
}

/// Body of `POST /v1/service/register`.
#[derive(Debug, Deserialize)]
pub struct ServiceRegistrationRequest {
    pub name: String,
    pub version: String,
    #[serde(default, alias = "base_url")]
    pub base_address: Option<String>,
    #[serde(default)]
    pub invocation_mode: Option<String>,
}

/// Body of `POST /v1/service/{service_id}/api/register`.
#[derive(Debug, Deserialize)]
pub struct ApiRegistrationRequest {
    #[serde(alias = "api_url")]
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub request_payload: Option<Value>,
    #[serde(default)]
    pub response_payload: Value,
    #[serde(default = "default_response_code")]
    pub response_code: u16,
    #[serde(default)]
    pub invocation_mode: Option<String>,
    /// Simulated latency applied before the mock is written.
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

fn default_response_code() -> u16 {
    200
}

impl IntoResponse for MoxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            MoxyError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            MoxyError::NotFound(_) | MoxyError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            MoxyError::UnsupportedVerb(_)
            | MoxyError::UnsupportedMode(_)
            | MoxyError::InvalidConfiguration(_)
            | MoxyError::MalformedPath(_)
            | MoxyError::InvalidPayload(_)
            | MoxyError::InvalidStatusCode(_) => StatusCode::BAD_REQUEST,
            MoxyError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MoxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MoxyError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            MoxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router: admin API under `/v1`, everything else dispatched.
pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/v1", get(handle_alive))
        .route("/v1/health", get(handle_alive))
        .route("/v1/info", get(handle_info))
        .route("/v1/stats", get(handle_stats))
        .route("/v1/service", get(handle_list_services))
        .route("/v1/service/register", post(handle_register_service))
        .route(
            "/v1/service/{service_id}",
            get(handle_get_service).delete(handle_unregister_service),
        )
        .route("/v1/service/{service_id}/api", get(handle_list_apis))
        .route("/v1/service/{service_id}/api/register", post(handle_register_api))
        .route("/v1/service/{service_id}/api/{api_id}", get(handle_get_api))
        .fallback(handle_dispatch)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "moxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("moxy shut down gracefully");
    Ok(())
}

/// Serialize `value` as indented JSON with the given status.
fn pretty_json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec_pretty(value) {
        Ok(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => MoxyError::Serialization(e).into_response(),
    }
}

async fn handle_alive() -> impl IntoResponse {
    (StatusCode::OK, "It's Alive!!!")
}

/// GET /v1/info
async fn handle_info() -> Response {
    pretty_json(
        StatusCode::OK,
        &serde_json::json!({
            "name": "moxy",
            "ver": env!("CARGO_PKG_VERSION"),
            "description": "Reverse Proxy with inbuilt mocking feature",
        }),
    )
}

/// GET /v1/stats
async fn handle_stats(State(state): State<Arc<AppState>>) -> Response {
    pretty_json(StatusCode::OK, &state.dispatcher.stats().snapshot())
}

/// POST /v1/service/register
async fn handle_register_service(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ServiceRegistrationRequest>,
) -> Response {
    let service = match state.registry().register_service(
        &req.name,
        &req.version,
        req.base_address.as_deref(),
        req.invocation_mode.as_deref(),
    ) {
        Ok(service) => service,
        Err(e) => return e.into_response(),
    };
    if service.allows_passthrough() {
        tracing::info!(service_id = %service.id, "Service routable, unmatched requests pass through");
    }
    pretty_json(StatusCode::CREATED, &*service)
}

/// GET /v1/service
async fn handle_list_services(State(state): State<Arc<AppState>>) -> Response {
    let services = state.registry().services();
    let services: Vec<_> = services.iter().map(|s| &**s).collect();
    pretty_json(StatusCode::OK, &services)
}

/// GET /v1/service/{service_id}
async fn handle_get_service(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
) -> Response {
    match state.registry().get_service_by_id(&service_id) {
        Ok(service) => pretty_json(StatusCode::OK, &*service),
        Err(e) => e.into_response(),
    }
}

/// DELETE /v1/service/{service_id}: idempotent, unknown ids succeed too.
async fn handle_unregister_service(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
) -> Response {
    state.registry().unregister_service_by_id(&service_id);
    StatusCode::NO_CONTENT.into_response()
}

/// POST /v1/service/{service_id}/api/register
async fn handle_register_api(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
    Json(req): Json<ApiRegistrationRequest>,
) -> Response {
    match register_api(state.registry(), &service_id, req) {
        Ok(body) => pretty_json(StatusCode::CREATED, &body),
        Err(e) => e.into_response(),
    }
}

fn register_api(registry: &Registry, service_id: &str, req: ApiRegistrationRequest) -> Result<Value> {
    let service = registry.get_service_by_id(service_id)?;
    let registration = ApiRegistration {
        path: req.path,
        verb: req.method.parse::<Verb>()?,
        payload: req.request_payload,
        response: MockedResponse {
            response_code: req.response_code,
            response_payload: req.response_payload,
        },
        mode: req.invocation_mode,
    };
    let body = match req.latency_ms {
        Some(ms) => {
            let api = registry.register_api_with_latency(&service, registration, Duration::from_millis(ms))?;
            serde_json::to_value(&api)
        }
        None => serde_json::to_value(registry.register_api(&service, registration)?),
    }
    .map_err(MoxyError::Serialization)?;

    // The first API makes a mock-only service reachable.
    if registry.routes_registered(&service) == 1 && !service.allows_passthrough() {
        tracing::info!(service_id = %service.id, "First API registered, service now routable");
    }
    Ok(body)
}

/// GET /v1/service/{service_id}/api
async fn handle_list_apis(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
) -> Response {
    match state.registry().get_service_by_id(&service_id) {
        Ok(service) => {
            let apis = state.registry().apis(&service);
            let apis: Vec<_> = apis.iter().map(|a| &**a).collect();
            pretty_json(StatusCode::OK, &apis)
        }
        Err(e) => e.into_response(),
    }
}

/// GET /v1/service/{service_id}/api/{api_id}
async fn handle_get_api(
    State(state): State<Arc<AppState>>,
    Path((service_id, api_id)): Path<(String, String)>,
) -> Response {
    let endpoint = state
        .registry()
        .get_service_by_id(&service_id)
        .and_then(|service| state.registry().get_api_by_id(&service, &api_id));
    match endpoint {
        Ok(endpoint) => pretty_json(StatusCode::OK, &*endpoint),
        Err(e) => e.into_response(),
    }
}

/// Fallback: every request outside the admin API is a mock or pass-through
/// call of the form `/{service_id}/{api_path}`.
///
/// The body is buffered under the router's `DefaultBodyLimit`, so oversized
/// bodies are rejected with 413 before dispatch.
async fn handle_dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound = InboundRequest {
        request_id: correlation::generate_id(),
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
        deadline: state
            .config
            .upstream
            .request_deadline()
            .map(|d| Instant::now() + d),
    };

    match state.dispatcher.dispatch(inbound).await {
        Ok(Dispatched::Mocked { response, latency }) => {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let status = StatusCode::from_u16(response.response_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            pretty_json(status, &response.response_payload)
        }
        Ok(Dispatched::Forwarded(response)) => response,
        Err(e) => e.into_response(),
    }
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
