//! HTTP routes for the room gate.
//!
//! Defines the Axum router and application state.

use crate::classifier::AdmissionClassifier;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{gate_room, http_metrics_middleware};
use crate::services::MembershipManager;
use crate::store::RoomStore;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Automated-agent and prefetch filter.
    pub classifier: Arc<AdmissionClassifier>,

    /// Membership Manager with the configured registration strategy.
    pub membership: Arc<MembershipManager>,

    /// Room store, for readiness checks.
    pub store: Arc<dyn RoomStore>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/ready` - Readiness probe (pings the room store)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/room/{id}` - Room entry behind the admission middleware
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Malformed room paths are routed here too so the middleware can send
    // them home
    let room_routes = Router::new()
        .route("/room", get(handlers::room_entry))
        .route("/room/*rest", get(handlers::room_entry))
        .route_layer(middleware::from_fn_with_state(state.clone(), gate_room))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(room_routes)
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// Unmatched paths: anything under `/room` goes home, the rest is 404.
async fn fallback(request: Request) -> Response {
    let path = request.uri().path();
    if path == "/room" || path.starts_with("/room/") {
        return Redirect::temporary("/").into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
