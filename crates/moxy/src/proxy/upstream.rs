//! The outbound binding a service holds for pass-through.

use reqwest::Url;

use crate::config::UpstreamConfig;
use crate::error::{MoxyError, Result};

/// A client bound to one service's base address.
///
/// Created at most once per service, the first time a pass-through mode
/// needs it, and owned by that service for the rest of its life.
#[derive(Debug)]
pub struct Upstream {
    service_id: String,
    base_address: String,
    client: reqwest::Client,
}

impl Upstream {
    pub fn connect(service_id: &str, base_address: &str, config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            service_id: service_id.to_string(),
            base_address: base_address.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Host part of the base address, for span fields.
    pub fn host(&self) -> &str {
        self.base_address
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or(&self.base_address)
    }

    /// Full upstream URL for a rewritten path and optional raw query string.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{path}?{q}", self.base_address),
            _ => format!("{}{path}", self.base_address),
        }
    }
}

/// Check that a base address is an absolute http(s) URL.
pub fn validate_base_address(base_address: &str) -> Result<()> {
    let url = Url::parse(base_address).map_err(|e| {
        MoxyError::InvalidConfiguration(format!("base address {base_address:?} is not a URL: {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(MoxyError::InvalidConfiguration(format!(
            "base address {base_address:?} has unsupported scheme {other:?}"
        ))),
    }
}
