//! Prometheus-compatible metrics for the matching engine: HTTP request
//! latency, order/trade counters, and database query latency.

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Metric names as constants for consistency.
pub mod names {
    // API Metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";

    // Matching Engine Metrics
    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_MATCHED_TOTAL: &str = "orders_matched_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDER_MATCH_DURATION_SECONDS: &str = "order_match_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_QUOTE: &str = "trade_volume_quote";

    // Risk Metrics
    pub const RISK_REJECTIONS_TOTAL: &str = "risk_rejections_total";
    pub const RISK_EVENTS_TOTAL: &str = "risk_events_total";

    // Trigger Monitor Metrics
    pub const TRIGGER_ORDERS_FIRED_TOTAL: &str = "trigger_orders_fired_total";
    pub const TRIGGER_MONITOR_TICK_DURATION_SECONDS: &str = "trigger_monitor_tick_duration_seconds";

    // Database Metrics
    pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";
    pub const DB_CONNECTIONS_ACTIVE: &str = "db_connections_active";
    pub const DB_CONNECTIONS_IDLE: &str = "db_connections_idle";
}

/// Label keys.
pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const ORDER_SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
    pub const MATCH_TYPE: &str = "match_type";
    pub const SYMBOL: &str = "symbol";
    pub const REASON: &str = "reason";
    pub const QUERY_TYPE: &str = "query_type";
}

/// Installs the Prometheus recorder and returns a handle used to render the
/// scrape endpoint's text body.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_MATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::DB_QUERY_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0],
        )
        .unwrap();

    builder.install_recorder().expect("failed to install prometheus recorder")
}

// ============================================================================
// HTTP Metrics
// ============================================================================

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str.clone()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str
    )
    .record(duration_secs);
}

pub fn increment_http_requests_in_flight() {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
}

pub fn decrement_http_requests_in_flight() {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
}

// ============================================================================
// Matching Engine Metrics
// ============================================================================

pub fn record_order_submitted(side: &str, order_type: &str) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::ORDER_SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

pub fn record_order_matched(match_type: &str) {
    counter!(
        names::ORDERS_MATCHED_TOTAL,
        labels::MATCH_TYPE => match_type.to_string()
    )
    .increment(1);
}

pub fn record_order_cancelled() {
    counter!(names::ORDERS_CANCELLED_TOTAL).increment(1);
}

pub fn record_order_match_duration(duration_secs: f64) {
    histogram!(names::ORDER_MATCH_DURATION_SECONDS).record(duration_secs);
}

pub fn record_trade_executed(symbol: &str, volume_quote: f64) {
    counter!(
        names::TRADES_EXECUTED_TOTAL,
        labels::SYMBOL => symbol.to_string()
    )
    .increment(1);

    counter!(names::TRADE_VOLUME_QUOTE, labels::SYMBOL => symbol.to_string()).increment(volume_quote as u64);
}

// ============================================================================
// Risk Metrics
// ============================================================================

pub fn record_risk_rejection(reason: &str) {
    counter!(names::RISK_REJECTIONS_TOTAL, labels::REASON => reason.to_string()).increment(1);
}

pub fn record_risk_event(reason: &str) {
    counter!(names::RISK_EVENTS_TOTAL, labels::REASON => reason.to_string()).increment(1);
}

// ============================================================================
// Trigger Monitor Metrics
// ============================================================================

pub fn record_trigger_fired(order_type: &str) {
    counter!(names::TRIGGER_ORDERS_FIRED_TOTAL, labels::ORDER_TYPE => order_type.to_string()).increment(1);
}

pub fn record_trigger_tick_duration(duration_secs: f64) {
    histogram!(names::TRIGGER_MONITOR_TICK_DURATION_SECONDS).record(duration_secs);
}

// ============================================================================
// Database Metrics
// ============================================================================

pub fn record_db_query(query_type: &str, duration_secs: f64) {
    histogram!(
        names::DB_QUERY_DURATION_SECONDS,
        labels::QUERY_TYPE => query_type.to_string()
    )
    .record(duration_secs);
}

pub fn set_db_connections(active: i64, idle: i64) {
    gauge!(names::DB_CONNECTIONS_ACTIVE).set(active as f64);
    gauge!(names::DB_CONNECTIONS_IDLE).set(idle as f64);
}

// ============================================================================
// Timer Helper
// ============================================================================

/// Timer for measuring durations around a call site.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_secs();
        assert!(elapsed >= 0.01);
        assert!(elapsed < 0.5);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(names::HTTP_REQUESTS_TOTAL, "http_requests_total");
        assert_eq!(names::ORDERS_SUBMITTED_TOTAL, "orders_submitted_total");
        assert_eq!(names::TRIGGER_ORDERS_FIRED_TOTAL, "trigger_orders_fired_total");
    }
}
