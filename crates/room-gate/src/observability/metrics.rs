//! Metrics definitions for the room gate.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_gate_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: 6 values (room ids are collapsed to `/room/{id}`)
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: bounded by admission outcomes and skip reasons
//! - `strategy`: 3 values (atomic, optimistic, lease)
//!
//! Room ids and credential tokens are never used as label values.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("room_gate_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Registration is one to a handful of store round trips, plus lease waits
        .set_buckets_for_metric(
            Matcher::Prefix("room_gate_registration".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set registration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `room_gate_http_requests_total`, `room_gate_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("room_gate_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("room_gate_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout.
///
/// Admission outcomes are redirects, so 3xx counts as success.
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/room" | "/room/" => "/room",
        _ if path.starts_with("/room/") => "/room/{id}",
        _ => "/other",
    }
}

// ============================================================================
// Admission Metrics
// ============================================================================

/// Record the outcome of one gated request.
///
/// Metric: `room_gate_admissions_total`
/// Labels: `outcome`
///
/// Outcomes: admitted, already_member, room_full, room_not_found,
/// skipped_automated_agent, skipped_purpose_prefetch,
/// skipped_router_prefetch, invalid_path, and `error_{kind}` for store-class
/// failures.
pub fn record_admission(outcome: &str) {
    counter!("room_gate_admissions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Registration Metrics
// ============================================================================

/// Record one registration attempt.
///
/// Metric: `room_gate_registration_duration_seconds`, `room_gate_registrations_total`
/// Labels: `strategy`, `status`
///
/// Status: the registration result label (admitted, already_member,
/// room_full, room_not_found) or `error`.
pub fn record_registration(strategy: &str, status: &str, duration: Duration) {
    histogram!("room_gate_registration_duration_seconds",
        "strategy" => strategy.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_gate_registrations_total",
        "strategy" => strategy.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a registration step that had to be repeated.
///
/// Metric: `room_gate_registration_retries_total`
/// Labels: `strategy`
///
/// Counts optimistic write conflicts, lease polls that found the lease
/// held, and the membership manager's single retry after a failure
/// (`strategy` is then the configured one).
pub fn record_registration_retry(strategy: &str) {
    counter!("room_gate_registration_retries_total",
        "strategy" => strategy.to_string()
    )
    .increment(1);
}
