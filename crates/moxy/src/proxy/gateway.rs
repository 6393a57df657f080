//! Forwarding of pass-through requests to a service's upstream.
//!
//! Bodies are streamed verbatim in both directions: no parsing, no
//! transformation.

use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use super::correlation::REQUEST_ID_HEADER;
use super::upstream::Upstream;
use crate::dispatch::InboundRequest;
use crate::error::{MoxyError, Result};

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// Sends a request to an upstream on behalf of the dispatcher.
///
/// Implementations must honor `request.deadline` when it is set and must not
/// retry.
#[async_trait]
pub trait ProxyGateway: Send + Sync {
    async fn forward(
        &self,
        upstream: &Upstream,
        rewritten_path: &str,
        request: InboundRequest,
    ) -> Result<Response>;
}

/// The reqwest-backed gateway used by the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpGateway;

#[async_trait]
impl ProxyGateway for HttpGateway {
    async fn forward(
        &self,
        upstream: &Upstream,
        rewritten_path: &str,
        request: InboundRequest,
    ) -> Result<Response> {
        let url = upstream.url_for(rewritten_path, request.query.as_deref());
        let span = moxy_tracing::forward_span!(&request.request_id, upstream.service_id(), upstream.host());
        let start = Instant::now();

        async {
            let method = Method::from_bytes(request.method.as_bytes())
                .map_err(|_| MoxyError::UnsupportedVerb(request.method.clone()))?;

            let mut req_builder = upstream
                .client()
                .request(method, &url)
                .body(request.body)
                .header(REQUEST_ID_HEADER, &request.request_id);

            for (name, value) in request.headers.iter() {
                let name_str = name.as_str().to_lowercase();
                if HOP_BY_HOP_HEADERS.contains(&name_str.as_str()) {
                    continue;
                }
                // reqwest sets content-length from the body
                if name_str == REQUEST_ID_HEADER || name_str == "content-length" {
                    continue;
                }
                req_builder = req_builder.header(name, value);
            }

            let send = req_builder.send();
            let upstream_resp = match request.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, send)
                    .await
                    .map_err(|_| MoxyError::UpstreamTimeout(url.clone()))?,
                None => send.await,
            }
            .inspect_err(|e| {
                tracing::error!(error = %e, url = %url, "Upstream request failed");
            })?;

            Ok(build_response(upstream_resp, start, &request.request_id))
        }
        .instrument(span)
        .await
    }
}

/// Build an axum Response from the upstream response, streaming the body back.
fn build_response(upstream_resp: reqwest::Response, start: Instant, request_id: &str) -> Response {
    let status = upstream_resp.status();
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);
    tracing::Span::current().record("status", status.as_u16());

    tracing::info!(
        status = status.as_u16(),
        latency_ms = latency,
        "Forward complete"
    );

    let mut response_builder = Response::builder().status(status);

    for (name, value) in upstream_resp.headers().iter() {
        let name_str = name.as_str().to_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&name_str.as_str()) {
            continue;
        }
        response_builder = response_builder.header(name, value);
    }

    response_builder = response_builder.header(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(request_id).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );

    let body = Body::from_stream(upstream_resp.bytes_stream());

    response_builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build response");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    })
}
