//! Admission classifier.
//!
//! Decides, from request metadata alone, whether a request comes from a real
//! participant or from an automated agent / prefetch that must not consume a
//! seat. Pure and I/O free: the classifier runs before any store access.
//!
//! # Decision rule (first match wins)
//!
//! 1. `user-agent` contains an automated-agent signature (case-insensitive)
//! 2. `purpose` (or `sec-purpose` when `purpose` is absent) contains "prefetch"
//! 3. `next-router-prefetch` is present with a non-empty value
//! 4. otherwise the request is a participant

use crate::config::ConfigError;
use axum::http::HeaderMap;
use regex::{Regex, RegexBuilder};

/// Header carrying the client's user agent.
pub const USER_AGENT_HEADER: &str = "user-agent";

/// Speculative-load purpose header.
pub const PURPOSE_HEADER: &str = "purpose";

/// Fallback purpose header sent by Chromium.
pub const SEC_PURPOSE_HEADER: &str = "sec-purpose";

/// Client-side router prefetch signal.
pub const ROUTER_PREFETCH_HEADER: &str = "next-router-prefetch";

/// The header values the classifier looks at.
///
/// `None` means the header was absent, which is distinct from present-but-empty
/// for the purpose fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    pub user_agent: Option<String>,
    pub purpose: Option<String>,
    pub sec_purpose: Option<String>,
    pub router_prefetch: Option<String>,
}

impl RequestSignals {
    /// Extract the classifier signals from request headers.
    ///
    /// Header values that are not valid visible ASCII are treated as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            user_agent: get(USER_AGENT_HEADER),
            purpose: get(PURPOSE_HEADER),
            sec_purpose: get(SEC_PURPOSE_HEADER),
            router_prefetch: get(ROUTER_PREFETCH_HEADER),
        }
    }
}

/// Why a request was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AutomatedAgent,
    PurposePrefetch,
    RouterPrefetch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AutomatedAgent => "automated_agent",
            SkipReason::PurposePrefetch => "purpose_prefetch",
            SkipReason::RouterPrefetch => "router_prefetch",
        }
    }
}

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Proceed to the membership manager.
    Participant,
    /// Pass the request through without touching room state.
    Skip(SkipReason),
}

/// Filters non-participant traffic before it reaches room state.
#[derive(Debug, Clone)]
pub struct AdmissionClassifier {
    bot_pattern: Regex,
}

impl AdmissionClassifier {
    /// Build a classifier from a set of user-agent signatures.
    ///
    /// Signatures are matched as literal substrings, case-insensitively.
    pub fn new(signatures: &[String]) -> Result<Self, ConfigError> {
        let alternation = signatures
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");

        if alternation.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "BOT_USER_AGENT_SIGNATURES".to_string(),
                reason: "must contain at least one signature".to_string(),
            });
        }

        let bot_pattern = RegexBuilder::new(&format!("({alternation})"))
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                name: "BOT_USER_AGENT_SIGNATURES".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { bot_pattern })
    }

    /// Classify a request.
    pub fn classify(&self, signals: &RequestSignals) -> Classification {
        let user_agent = signals.user_agent.as_deref().unwrap_or("");
        if self.bot_pattern.is_match(user_agent) {
            return Classification::Skip(SkipReason::AutomatedAgent);
        }

        // `sec-purpose` is only consulted when `purpose` is absent entirely.
        let purpose = signals
            .purpose
            .as_deref()
            .or(signals.sec_purpose.as_deref())
            .unwrap_or("");
        if purpose.to_ascii_lowercase().contains("prefetch") {
            return Classification::Skip(SkipReason::PurposePrefetch);
        }

        if signals
            .router_prefetch
            .as_deref()
            .is_some_and(|v| !v.is_empty())
        {
            return Classification::Skip(SkipReason::RouterPrefetch);
        }

        Classification::Participant
    }
}
