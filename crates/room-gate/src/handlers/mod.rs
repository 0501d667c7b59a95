//! HTTP request handlers for the room gate.

pub mod health;
pub mod metrics;
pub mod room;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use room::room_entry;
