//! Room store.
//!
//! The room store is the only holder of durable state. Rooms live in a
//! hash keyed by `meta:{roomId}` with two fields:
//!
//! - `connected` - JSON array of credential tokens, in admission order
//! - `createdAt` - creation timestamp (number)
//!
//! Every operation is a suspension point. Writes replace the whole
//! `connected` value in one command so a half-applied append is impossible.
//!
//! # Implementations
//!
//! - [`RedisRoomStore`] - Redis with Lua scripts for the conditional writes
//! - [`InMemoryRoomStore`] - process-local store for `memory://` and tests

pub mod lua_scripts;
pub mod memory;
pub mod redis;

pub use self::memory::InMemoryRoomStore;
pub use self::redis::RedisRoomStore;

use crate::errors::GateError;
use crate::models::RoomRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Hash field holding the admitted credentials.
pub const CONNECTED_FIELD: &str = "connected";

/// Hash field holding the creation timestamp.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// URL scheme selecting the in-process store.
pub const MEMORY_STORE_URL: &str = "memory://";

/// Store key for a room's metadata hash.
pub fn room_key(room_id: &str) -> String {
    format!("meta:{room_id}")
}

/// Store key for a room's registration lease.
pub fn lease_key(room_id: &str) -> String {
    format!("lease:{room_id}")
}

/// Result of a conditional append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    AlreadyMember,
    Full,
    NotFound,
}

/// Result of a compare-and-swap on `connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Swapped,
    Conflict,
    NotFound,
}

/// Room key-value store consumed by the membership manager and registrars.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Load a room, `None` if it does not exist.
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, GateError>;

    /// Replace `connected` on an existing room.
    ///
    /// Returns `false` without writing if the room no longer exists.
    async fn set_connected(&self, room_id: &str, connected: &[String]) -> Result<bool, GateError>;

    /// Atomically append `token` unless `presented` is already a member or
    /// the room already holds `max` participants.
    ///
    /// A `token` that is already listed reports `Appended` without writing,
    /// so repeating an append whose reply was lost is harmless.
    async fn append_if_below(
        &self,
        room_id: &str,
        presented: Option<&str>,
        token: &str,
        max: usize,
    ) -> Result<AppendOutcome, GateError>;

    /// Atomically replace `connected` with `replacement` if it still equals `expected`.
    async fn compare_and_swap_connected(
        &self,
        room_id: &str,
        expected: &[String],
        replacement: &[String],
    ) -> Result<CasOutcome, GateError>;

    /// Try to take the room's registration lease. Returns `true` if acquired.
    async fn acquire_lease(
        &self,
        room_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, GateError>;

    /// Release the lease if `holder` still owns it.
    async fn release_lease(&self, room_id: &str, holder: &str) -> Result<(), GateError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), GateError>;
}

/// Connect to the room store named by `url`.
///
/// `memory://` selects the in-process store; anything else is handed to
/// the Redis client.
pub async fn connect(url: &str) -> Result<Arc<dyn RoomStore>, GateError> {
    if url == MEMORY_STORE_URL {
        return Ok(Arc::new(InMemoryRoomStore::new()));
    }

    Ok(Arc::new(RedisRoomStore::new(url).await?))
}

/// Decode a room hash into a [`RoomRecord`].
///
/// Missing or undecodable `connected`/`createdAt` fields are reported as
/// [`GateError::MalformedState`].
pub fn decode_room(room_id: &str, fields: &HashMap<String, String>) -> Result<RoomRecord, GateError> {
    let connected_raw = fields.get(CONNECTED_FIELD).ok_or_else(|| {
        GateError::MalformedState(format!("room {room_id} has no {CONNECTED_FIELD} field"))
    })?;

    let connected: Vec<String> = serde_json::from_str(connected_raw).map_err(|e| {
        GateError::MalformedState(format!(
            "room {room_id} has undecodable {CONNECTED_FIELD}: {e}"
        ))
    })?;

    let created_at_raw = fields.get(CREATED_AT_FIELD).ok_or_else(|| {
        GateError::MalformedState(format!("room {room_id} has no {CREATED_AT_FIELD} field"))
    })?;

    let created_at = parse_timestamp(created_at_raw).ok_or_else(|| {
        GateError::MalformedState(format!(
            "room {room_id} has non-numeric {CREATED_AT_FIELD}"
        ))
    })?;

    Ok(RoomRecord {
        connected,
        created_at,
    })
}

/// Encode `connected` the way it is stored in the room hash.
pub fn encode_connected(connected: &[String]) -> Result<String, GateError> {
    serde_json::to_string(connected)
        .map_err(|e| GateError::Store(format!("failed to encode {CONNECTED_FIELD}: {e}")))
}

/// Timestamps written by JavaScript clients may carry a fractional part.
fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f as i64)
    })
}
