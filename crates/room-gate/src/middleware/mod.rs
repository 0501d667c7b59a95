//! Middleware for the room gate.
//!
//! # Components
//!
//! - `admission` - Admission gate in front of room routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod admission;
pub mod http_metrics;

pub use admission::{gate_room, CREDENTIAL_COOKIE};
pub use http_metrics::http_metrics_middleware;
