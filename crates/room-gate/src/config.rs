//! Room gate configuration.
//!
//! Configuration is loaded from environment variables once at startup and
//! injected into the classifier, membership manager and middleware. The
//! store URL is redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default room capacity.
pub const DEFAULT_MAX_ROOM_PARTICIPANTS: usize = 3;

/// Default automated-agent user-agent signatures (matched case-insensitively).
pub const DEFAULT_BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "preview",
    "facebookexternalhit",
    "whatsapp",
    "telegrambot",
    "twitterbot",
    "slackbot",
    "discordbot",
    "linkedinbot",
];

/// Default number of compare-and-swap attempts for the optimistic strategy.
pub const DEFAULT_OPTIMISTIC_MAX_ATTEMPTS: u32 = 5;

/// Default room lease TTL in milliseconds.
pub const DEFAULT_ROOM_LEASE_TTL_MS: u64 = 2000;

/// Default time to wait for a contended room lease in milliseconds.
pub const DEFAULT_ROOM_LEASE_WAIT_MS: u64 = 1000;

/// Default redirect destination for store-class failures.
pub const DEFAULT_STORE_ERROR_REDIRECT: &str = "/?error=unavailable";

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 0;

/// Deployment environment.
///
/// Production turns on the `Secure` attribute of the credential cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Concurrency-control mechanism behind participant registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStrategy {
    /// Single store-side conditional append (Lua script on Redis).
    AtomicAppend,
    /// Read, then compare-and-swap the whole `connected` value, retrying on conflict.
    Optimistic,
    /// Per-room lease held across the check-then-write.
    Lease,
}

impl RegistrationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStrategy::AtomicAppend => "atomic",
            RegistrationStrategy::Optimistic => "optimistic",
            RegistrationStrategy::Lease => "lease",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "atomic" => Some(RegistrationStrategy::AtomicAppend),
            "optimistic" => Some(RegistrationStrategy::Optimistic),
            "lease" => Some(RegistrationStrategy::Lease),
            _ => None,
        }
    }
}

/// Room gate configuration.
#[derive(Clone)]
pub struct Config {
    /// Room store URL (`redis://...` or `memory://`).
    /// Protected by `SecretString` since it may embed credentials.
    pub redis_url: SecretString,

    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Deployment environment (default: development).
    pub environment: Environment,

    /// Maximum admitted participants per room (default: 3).
    pub max_room_participants: usize,

    /// User-agent substrings identifying automated agents.
    pub bot_signatures: Vec<String>,

    /// Concurrency-control strategy for registration (default: atomic).
    pub registration_strategy: RegistrationStrategy,

    /// CAS attempts before the optimistic strategy gives up.
    pub optimistic_max_attempts: u32,

    /// Room lease TTL in milliseconds.
    pub room_lease_ttl_ms: u64,

    /// How long the lease strategy waits for a contended lease.
    pub room_lease_wait_ms: u64,

    /// Redirect destination for store-class failures.
    pub store_error_redirect: String,

    /// Seconds to keep draining connections after a shutdown signal.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts the store URL.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("environment", &self.environment)
            .field("max_room_participants", &self.max_room_participants)
            .field("bot_signatures", &self.bot_signatures)
            .field("registration_strategy", &self.registration_strategy)
            .field("optimistic_max_attempts", &self.optimistic_max_attempts)
            .field("room_lease_ttl_ms", &self.room_lease_ttl_ms)
            .field("room_lease_wait_ms", &self.room_lease_wait_ms)
            .field("store_error_redirect", &self.store_error_redirect)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl ConfigError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = vars
            .get("REDIS_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?;
        let redis_url = SecretString::from(redis_url.clone());

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let environment = match vars.get("ROOM_GATE_ENVIRONMENT").map(|s| s.trim()) {
            None | Some("") | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "ROOM_GATE_ENVIRONMENT",
                    format!("expected 'development' or 'production', got '{other}'"),
                ))
            }
        };

        let max_room_participants = parse_positive(
            vars,
            "MAX_ROOM_PARTICIPANTS",
            DEFAULT_MAX_ROOM_PARTICIPANTS,
        )?;

        let bot_signatures = match vars.get("BOT_USER_AGENT_SIGNATURES") {
            Some(value) => {
                let signatures: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if signatures.is_empty() {
                    return Err(ConfigError::invalid(
                        "BOT_USER_AGENT_SIGNATURES",
                        "must contain at least one signature",
                    ));
                }
                signatures
            }
            None => DEFAULT_BOT_SIGNATURES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        };

        let registration_strategy = match vars.get("REGISTRATION_STRATEGY") {
            Some(value) => RegistrationStrategy::parse(value).ok_or_else(|| {
                ConfigError::invalid(
                    "REGISTRATION_STRATEGY",
                    format!("expected 'atomic', 'optimistic' or 'lease', got '{value}'"),
                )
            })?,
            None => RegistrationStrategy::AtomicAppend,
        };

        let optimistic_max_attempts = parse_positive(
            vars,
            "OPTIMISTIC_MAX_ATTEMPTS",
            DEFAULT_OPTIMISTIC_MAX_ATTEMPTS,
        )?;

        let room_lease_ttl_ms = parse_positive(vars, "ROOM_LEASE_TTL_MS", DEFAULT_ROOM_LEASE_TTL_MS)?;

        let room_lease_wait_ms =
            parse_non_negative(vars, "ROOM_LEASE_WAIT_MS", DEFAULT_ROOM_LEASE_WAIT_MS)?;

        let store_error_redirect = vars
            .get("STORE_ERROR_REDIRECT")
            .cloned()
            .unwrap_or_else(|| DEFAULT_STORE_ERROR_REDIRECT.to_string());

        if !is_site_relative(&store_error_redirect) {
            return Err(ConfigError::invalid(
                "STORE_ERROR_REDIRECT",
                "must be a site-relative path starting with a single '/'",
            ));
        }

        let drain_seconds = parse_non_negative(vars, "GATE_DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS)?;

        Ok(Config {
            redis_url,
            bind_address,
            environment,
            max_room_participants,
            bot_signatures,
            registration_strategy,
            optimistic_max_attempts,
            room_lease_ttl_ms,
            room_lease_wait_ms,
            store_error_redirect,
            drain_seconds,
        })
    }
}

/// Parse an optional strictly positive integer variable.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e: T::Err| {
        ConfigError::invalid(
            name,
            format!("must be a valid positive integer, got '{value_str}': {e}"),
        )
    })?;

    if value <= T::default() {
        return Err(ConfigError::invalid(name, "must be greater than 0"));
    }

    Ok(value)
}

/// Parse an optional non-negative integer variable.
fn parse_non_negative(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(value) => value.trim().parse::<u64>().map_err(|e| {
            ConfigError::invalid(
                name,
                format!("must be a non-negative integer, got '{value}': {e}"),
            )
        }),
        None => Ok(default),
    }
}

/// A redirect target that stays on this site.
///
/// Browsers treat `//host` and `/\host` as protocol-relative URLs, and a
/// `Location` value must be a visible-ASCII header value.
fn is_site_relative(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target.starts_with("/\\")
        && target.bytes().all(|b| b.is_ascii_graphic())
}
