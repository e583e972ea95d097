//! # dcc-api: DCC Server Services
//!
//! Registration lifecycle, lab claims, signing orchestration and staged
//! retention for digital COVID certificates, on pluggable storage.
//!
//! ## Layout
//!
//! | Module          | Concern                                              |
//! |-----------------|------------------------------------------------------|
//! | [`services`]    | The library API: lifecycle, claims, signing, upload, retention |
//! | [`store`]       | Storage traits and the in-memory backend             |
//! | [`db`]          | Postgres backend (SQLx)                              |
//! | [`error`]       | [`DccError`](error::DccError) and its HTTP status mapping |
//! | [`config`]      | [`DccConfig`](config::DccConfig), from YAML or environment |
//! | [`metrics`]     | Counter names and the Prometheus recorder            |
//! | [`state`]       | Service wiring                                       |
//!
//! ## HTTP surface
//!
//! The binary serves health probes and `/metrics` only. Registration and
//! upload endpoints belong to the perimeter in front of this server, which
//! calls the services and returns [`DccError`](error::DccError) as its
//! response.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod services;
pub mod state;
pub mod store;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the operational router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .route("/metrics", axum::routing::get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe: always 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the database, if any, answers.
async fn readiness(State(state): State<AppState>) -> Response {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %e, "readiness check: database unreachable");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response();
        }
    }
    "ready".into_response()
}

/// GET /metrics: Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
