//! Liveness and readiness probes, and the Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::StatusCode;

use crate::api::AppState;

pub async fn liveness() -> &'static str {
    "OK"
}

/// Readiness pings the database pool; a process that can't reach Postgres
/// can be up but not ready to serve `TradingService` calls.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match sqlx::query("SELECT 1").execute(&state.service.context().db).await {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "database unreachable"),
    }
}

pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
