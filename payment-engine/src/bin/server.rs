//! Payment server binary
//!
//! Usage: `payment-server [config.toml]`. Without a path, configuration is
//! read from `PAYMENTS_*` environment variables.

use anyhow::Context;
use payment_engine::{telemetry, Config, PaymentEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .and_then(Config::with_env_overrides)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };

    telemetry::init_tracing(&config.logging)?;
    tracing::info!(service = %config.service_name, "Starting payment server");

    let engine = PaymentEngine::new(config)?;
    let sweep = engine.start_reconciliation();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutting down payment server");

    if let Some(sweep) = sweep {
        sweep.shutdown().await?;
    }

    match engine.metrics().gather_text() {
        Ok(metrics) => tracing::debug!(%metrics, "Final metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to gather metrics"),
    }
    Ok(())
}
