//! Room Gate Library
//!
//! Admission control for capacity-bounded rooms. For every request aimed at
//! `/room/<id>` the gate:
//!
//! - Filters automated agents and prefetches before any store access
//! - Recognises callers already holding a credential for the room
//! - Rejects callers once the room is at capacity
//! - Registers new participants without overshooting capacity under
//!   concurrent joins, and issues them a credential cookie
//!
//! # Architecture
//!
//! The gate follows the Middleware -> Service -> Store pattern:
//!
//! ```text
//! routes/mod.rs -> middleware/admission.rs -> services/membership.rs
//!                                          -> services/registration.rs -> store/*.rs
//! ```
//!
//! # Modules
//!
//! - `classifier` - Automated-agent and prefetch filter
//! - `config` - Service configuration from environment
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Admission gate and HTTP metrics middleware
//! - `models` - Data models
//! - `observability` - Metrics definitions
//! - `routes` - Axum router setup
//! - `services` - Membership Manager and registration strategies
//! - `store` - Room store trait with Redis and in-memory backends
//! - `token` - Credential token generation

pub mod classifier;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod store;
pub mod token;
