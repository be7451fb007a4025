//! Minimal HTTP surface: liveness/readiness plus the Prometheus scrape
//! endpoint. Order submission, cancellation, depth, and trade history are
//! served through `crate::orchestrator::TradingService`'s façade directly by
//! external collaborators — this module does not re-expose them over HTTP.

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::orchestrator::TradingService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TradingService>,
    pub metrics_handle: PrometheusHandle,
}
