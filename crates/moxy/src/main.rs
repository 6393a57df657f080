//! moxy: reverse proxy with built-in API mocking.

use std::sync::Arc;

use moxy::config::MoxyConfig;
use moxy::proxy::HttpGateway;
use moxy::server::{self, AppState};
use moxy::stats::DispatchStats;
use moxy::{Dispatcher, Registry};

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("MOXY_CONFIG").ok())
        .unwrap_or_else(|| "moxy.toml".to_string());

    let listen_override = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned());

    let mut config = MoxyConfig::load(&config_path)?;
    if let Some(addr) = listen_override {
        config.server.listen_address = addr;
    }

    // Build the tokio runtime first: the tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = moxy_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            otlp_export = tracing_guard.exporting(),
            request_deadline_secs = ?config.upstream.request_deadline_secs,
            "Starting moxy"
        );

        run(config).await
    })
}

async fn run(config: MoxyConfig) -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(config.upstream.clone()));
    let dispatcher = Dispatcher::new(registry, Arc::new(HttpGateway), DispatchStats::new());

    let state = AppState { config, dispatcher };

    server::run(state).await
}
