//! Credential token generation.
//!
//! Tokens are opaque membership proofs: 128 bits from the system CSPRNG,
//! encoded as unpadded base64url so they are safe in cookies and URLs.
//! They are not signed; possession is the proof.

use crate::errors::GateError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

/// Number of random bytes per credential token (128 bits).
pub const TOKEN_RANDOM_BYTES: usize = 16;

/// Produces collision-resistant, URL-safe credential tokens.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> Result<String, GateError>;
}

/// CSPRNG-backed token generator.
#[derive(Debug, Clone)]
pub struct RandomTokenGenerator {
    rng: SystemRandom,
}

impl Default for RandomTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomTokenGenerator {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> Result<String, GateError> {
        let mut bytes = [0u8; TOKEN_RANDOM_BYTES];

        self.rng.fill(&mut bytes).map_err(|e| {
            tracing::error!(target: "room_gate.token", error = %e, "Failed to generate random bytes for credential");
            GateError::TokenGeneration("RNG failure".to_string())
        })?;

        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Deterministic token generator for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Issues `{prefix}1`, `{prefix}2`, ... in call order.
    #[derive(Debug)]
    pub struct SequentialTokenGenerator {
        prefix: String,
        issued: AtomicUsize,
    }

    impl SequentialTokenGenerator {
        pub fn new(prefix: &str) -> Self {
            Self {
                prefix: prefix.to_string(),
                issued: AtomicUsize::new(0),
            }
        }

        /// Number of tokens issued so far.
        pub fn issued(&self) -> usize {
            self.issued.load(Ordering::SeqCst)
        }
    }

    impl TokenGenerator for SequentialTokenGenerator {
        fn generate(&self) -> Result<String, GateError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}{n}", self.prefix))
        }
    }
}
