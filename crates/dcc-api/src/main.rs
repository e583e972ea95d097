//! # dcc-server: Binary Entry Point
//!
//! Loads configuration, validates the DCCI prefix, connects storage and
//! the oracle clients, starts the retention sweeper and serves the
//! operational endpoints (default port 8080).

use std::sync::Arc;

use anyhow::Context;
use dcc_api::config::DccConfig;
use dcc_api::state::{AppState, Backends};
use dcc_client::{OracleClients, OracleConfig};
use dcc_core::DcciGenerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = DccConfig::load().context("failed to load configuration")?;

    // Fail fast: no traffic is accepted with an unusable DCCI prefix.
    DcciGenerator::new(config.dcci_prefix.as_str()).map_err(|e| {
        tracing::error!("DCCI prefix rejected: {e}");
        e
    })?;

    let metrics = dcc_api::metrics::install_recorder().context("failed to install metrics recorder")?;

    // Initialize database pool (optional; absent means in-memory only).
    let db_pool = dcc_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let oracle_config = OracleConfig::from_env().context("oracle clients are not configured")?;
    tracing::info!(?oracle_config, "oracle clients configured");
    let oracles = OracleClients::new(oracle_config)?;

    let backends = match &db_pool {
        Some(pool) => Backends::postgres(pool.clone()),
        None => Backends::in_memory(),
    };

    let mut state = AppState::build(
        config.clone(),
        backends,
        Arc::new(oracles.verification().clone()),
        Arc::new(oracles.signing().clone()),
    )?
    .with_metrics(metrics);
    if let Some(pool) = db_pool {
        state = state.with_db_pool(pool);
    }

    let sweeper = Arc::clone(&state.sweeper);
    tracing::info!(
        holder = sweeper.holder(),
        rate_ms = config.cleanup.rate_ms,
        "starting retention sweeper"
    );
    let sweeper_task = sweeper.spawn();

    let app = dcc_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("DCC server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper_task.abort();
    Ok(())
}

/// Structured tracing; JSON lines when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
