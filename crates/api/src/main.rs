//! Malaria Detect - Main Entry Point

use anyhow::{anyhow, Context};
use api::{build_state, config::AppConfig, init_logging, run_server};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("=== Malaria Detect v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let state = build_state(config, Some(metrics)).await?;
    run_server(Arc::new(state)).await
}
