//! Request id generation for tracing a call across moxy and an upstream.

use uuid::Uuid;

/// Header carrying the request id on forwarded requests and their responses.
pub const REQUEST_ID_HEADER: &str = "x-moxy-request-id";

/// Generate a new request id (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
