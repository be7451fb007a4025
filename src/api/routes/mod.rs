use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::handlers::health;
use crate::api::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
