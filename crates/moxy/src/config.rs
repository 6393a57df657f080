//! Configuration types and loading logic.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use moxy_tracing::TracingConfig;
use serde::Deserialize;

/// Top-level moxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Largest request body read from a client, registration or dispatch.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Settings for the per-service clients used in pass-through.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// When set, every forwarded request gets a deadline this far in the
    /// future. Unset means forwards wait as long as the upstream takes.
    #[serde(default)]
    pub request_deadline_secs: Option<u64>,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_deadline_secs: None,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_secs.map(Duration::from_secs)
    }
}

impl MoxyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (MOXY_ prefix, __ for nesting)
    /// 2. TOML config file (a missing file is skipped)
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: MoxyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("MOXY_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = MoxyConfig::load("/nonexistent/moxy.toml").unwrap();

        assert_eq!(config.server.listen_address, "0.0.0.0:8080");
        assert_eq!(config.server.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upstream.connect_timeout(), Duration::from_secs(10));
        assert!(config.upstream.request_deadline().is_none());
    }

    #[test]
    fn test_toml_sections() {
        let toml = r#"
            [server]
            listen_address = "127.0.0.1:9999"

            [upstream]
            request_deadline_secs = 30

            [tracing]
            log_level = "moxy=debug"
        "#;
        let config: MoxyConfig = Figment::from(Toml::string(toml)).extract().unwrap();

        assert_eq!(config.server.listen_address, "127.0.0.1:9999");
        assert_eq!(config.upstream.request_deadline(), Some(Duration::from_secs(30)));
        assert_eq!(config.tracing.log_level, "moxy=debug");
    }
}
