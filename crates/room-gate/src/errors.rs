//! Room gate error types.
//!
//! Every variant is a store-class failure from the caller's point of view:
//! the admission middleware redirects to the configured error destination
//! and never admits the caller. Underlying details are logged server-side
//! and never reach the client.

use thiserror::Error;

/// Room gate error type.
///
/// - Store: room store unreachable or a command failed
/// - MalformedState: room record is missing `connected`/`createdAt` or is undecodable
/// - Contention: optimistic retries exhausted or room lease not obtained in time
/// - TokenGeneration: CSPRNG failure while issuing a credential
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Malformed room state: {0}")]
    MalformedState(String),

    #[error("Registration contention: {0}")]
    Contention(String),

    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
}

impl GateError {
    /// Bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Store(_) => "store",
            GateError::MalformedState(_) => "malformed_state",
            GateError::Contention(_) => "contention",
            GateError::TokenGeneration(_) => "token_generation",
        }
    }
}

/// Convert redis errors to GateError
impl From<redis::RedisError> for GateError {
    fn from(err: redis::RedisError) -> Self {
        GateError::Store(err.to_string())
    }
}
