//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated so Prometheus can scrape it. Labels never carry room ids
//! or credentials.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE room_gate_admissions_total counter
/// room_gate_admissions_total{outcome="admitted"} 42
/// ```
#[tracing::instrument(skip_all, name = "room_gate.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
