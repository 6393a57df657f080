//! Span builder helpers for moxy instrumentation.

/// Create the top-level span for one inbound request going through dispatch.
///
/// Usage: `let span = dispatch_span!(request_id, method, path);`
///
/// Fields recorded later by the dispatcher:
/// - `service_id`: first path segment, once parsed
/// - `api_id`: fingerprint of the matched API (empty on a miss)
/// - `outcome`: `mocked` or `forwarded`
#[macro_export]
macro_rules! dispatch_span {
    ($request_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "dispatch",
            request_id = %$request_id,
            method = %$method,
            path = %$path,
            service_id = tracing::field::Empty,
            api_id = tracing::field::Empty,
            outcome = tracing::field::Empty,
        )
    };
}

/// Create a span for a pass-through forward to a service's upstream.
#[macro_export]
macro_rules! forward_span {
    ($request_id:expr, $service_id:expr, $upstream:expr) => {
        tracing::info_span!(
            "upstream_forward",
            request_id = %$request_id,
            service_id = %$service_id,
            upstream = %$upstream,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
