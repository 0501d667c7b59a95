//! HTTP metrics middleware.
//!
//! Records every response, including redirects issued by the admission
//! middleware and framework-level errors (404, 405) that never reach a
//! handler.

use crate::observability::metrics::record_http_request;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Middleware that records method, normalized path, status and duration.
///
/// Applied as the outermost layer so it sees every response.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(
        method.as_str(),
        &path,
        response.status().as_u16(),
        start.elapsed(),
    );

    response
}
