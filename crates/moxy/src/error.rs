//! Error type shared by the registry, mode resolver and dispatcher.

use thiserror::Error;

/// Everything the core can fail with. Nothing here is retried; each variant
/// goes straight back to the caller that triggered it.
#[derive(Debug, Error)]
pub enum MoxyError {
    #[error("{0} already registered")]
    AlreadyRegistered(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("service {0} is not registered")]
    ServiceNotFound(String),

    #[error("unsupported HTTP verb {0:?}, expected one of GET, POST, DELETE, PUT")]
    UnsupportedVerb(String),

    #[error("unsupported invocation mode {0:?}")]
    UnsupportedMode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed path {0:?}, expected /{{serviceID}}/{{apiPath}}")]
    MalformedPath(String),

    #[error("request payload is not valid JSON: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("invalid response code {0}")]
    InvalidStatusCode(u16),

    #[error("failed to serialize payload: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("upstream {0} did not respond before the deadline")]
    UpstreamTimeout(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

pub type Result<T, E = MoxyError> = std::result::Result<T, E>;
