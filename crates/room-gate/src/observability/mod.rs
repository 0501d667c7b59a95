//! Observability module for the room gate.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;

pub use metrics::init_metrics_recorder;
