//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks room store connectivity

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does not check any dependencies; an unreachable store only affects
/// readiness.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 if the room store answers a ping, 503 otherwise. The
/// underlying error is logged, never returned.
#[tracing::instrument(skip_all, name = "room_gate.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(target: "room_gate.health", error = %e, "Readiness check failed: room store unreachable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                store: Some("unhealthy"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            store: Some("healthy"),
            error: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }
}
