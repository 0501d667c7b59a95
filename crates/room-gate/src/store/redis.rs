//! Redis-backed room store.
//!
//! # Key Patterns
//!
//! - `meta:{roomId}` - Room metadata (HASH: `connected`, `createdAt`)
//! - `lease:{roomId}` - Registration lease (STRING, holder id, PX expiry)
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so every operation clones it instead of locking.

use crate::errors::GateError;
use crate::models::RoomRecord;
use crate::store::{
    decode_room, encode_connected, lease_key, lua_scripts, room_key, AppendOutcome, CasOutcome,
    RoomStore,
};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Redis room store.
#[derive(Clone)]
pub struct RedisRoomStore {
    /// Multiplexed connection (cheaply cloneable, designed for concurrent use).
    connection: MultiplexedConnection,
    /// Precompiled Lua scripts.
    conditional_append_script: Script,
    compare_and_swap_script: Script,
    set_connected_script: Script,
    release_lease_script: Script,
}

impl RedisRoomStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Store` if the URL is invalid or the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, GateError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do not log redis_url, it may contain credentials
            error!(
                target: "room_gate.store.redis",
                error = %e,
                "Failed to open Redis client"
            );
            GateError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(
                    target: "room_gate.store.redis",
                    error = %e,
                    "Failed to connect to Redis"
                );
                GateError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            conditional_append_script: Script::new(lua_scripts::CONDITIONAL_APPEND),
            compare_and_swap_script: Script::new(lua_scripts::COMPARE_AND_SWAP_CONNECTED),
            set_connected_script: Script::new(lua_scripts::SET_CONNECTED_IF_EXISTS),
            release_lease_script: Script::new(lua_scripts::RELEASE_LEASE),
        })
    }
}

/// Map the shared negative script codes to errors.
fn script_failure(room_id: &str, operation: &str, code: i64) -> GateError {
    match code {
        -1 => {
            warn!(
                target: "room_gate.store.redis",
                room_id = %room_id,
                operation = operation,
                "Room record is malformed"
            );
            GateError::MalformedState(format!("room {room_id} has a malformed connected field"))
        }
        _ => {
            error!(
                target: "room_gate.store.redis",
                room_id = %room_id,
                operation = operation,
                result = code,
                "Unexpected script result"
            );
            GateError::Store(format!("{operation} returned unexpected result {code}"))
        }
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, GateError> {
        let mut conn = self.connection.clone();

        let fields: HashMap<String, String> =
            conn.hgetall(room_key(room_id)).await.map_err(|e| {
                warn!(
                    target: "room_gate.store.redis",
                    error = %e,
                    room_id = %room_id,
                    "Failed to load room"
                );
                GateError::Store(format!("Failed to load room: {e}"))
            })?;

        // HGETALL on a missing key is an empty hash
        if fields.is_empty() {
            return Ok(None);
        }

        decode_room(room_id, &fields).map(Some)
    }

    #[instrument(skip_all, fields(room_id = %room_id, count = connected.len()))]
    async fn set_connected(&self, room_id: &str, connected: &[String]) -> Result<bool, GateError> {
        let mut conn = self.connection.clone();
        let encoded = encode_connected(connected)?;

        let result: i64 = self
            .set_connected_script
            .key(room_key(room_id))
            .arg(encoded)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room_gate.store.redis",
                    error = %e,
                    room_id = %room_id,
                    "Failed to write connected"
                );
                GateError::Store(format!("Failed to write connected: {e}"))
            })?;

        Ok(result == 1)
    }

    #[instrument(skip_all, fields(room_id = %room_id, max = max))]
    async fn append_if_below(
        &self,
        room_id: &str,
        presented: Option<&str>,
        token: &str,
        max: usize,
    ) -> Result<AppendOutcome, GateError> {
        let mut conn = self.connection.clone();

        let result: i64 = self
            .conditional_append_script
            .key(room_key(room_id))
            .arg(presented.unwrap_or(""))
            .arg(token)
            .arg(max)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room_gate.store.redis",
                    error = %e,
                    room_id = %room_id,
                    "Conditional append failed"
                );
                GateError::Store(format!("Conditional append failed: {e}"))
            })?;

        match result {
            1 => {
                debug!(target: "room_gate.store.redis", room_id = %room_id, "Appended participant");
                Ok(AppendOutcome::Appended)
            }
            2 => Ok(AppendOutcome::AlreadyMember),
            0 => Ok(AppendOutcome::Full),
            -2 => Ok(AppendOutcome::NotFound),
            code => Err(script_failure(room_id, "conditional_append", code)),
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id, expected = expected.len()))]
    async fn compare_and_swap_connected(
        &self,
        room_id: &str,
        expected: &[String],
        replacement: &[String],
    ) -> Result<CasOutcome, GateError> {
        let mut conn = self.connection.clone();
        let expected_json = encode_connected(expected)?;
        let replacement_json = encode_connected(replacement)?;

        let result: i64 = self
            .compare_and_swap_script
            .key(room_key(room_id))
            .arg(expected_json)
            .arg(replacement_json)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room_gate.store.redis",
                    error = %e,
                    room_id = %room_id,
                    "Compare-and-swap failed"
                );
                GateError::Store(format!("Compare-and-swap failed: {e}"))
            })?;

        match result {
            1 => Ok(CasOutcome::Swapped),
            0 => Ok(CasOutcome::Conflict),
            -2 => Ok(CasOutcome::NotFound),
            code => Err(script_failure(room_id, "compare_and_swap", code)),
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn acquire_lease(
        &self,
        room_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, GateError> {
        let mut conn = self.connection.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(lease_key(room_id))
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room_gate.store.redis",
                    error = %e,
                    room_id = %room_id,
                    "Failed to acquire room lease"
                );
                GateError::Store(format!("Failed to acquire room lease: {e}"))
            })?;

        Ok(reply.is_some())
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn release_lease(&self, room_id: &str, holder: &str) -> Result<(), GateError> {
        let mut conn = self.connection.clone();

        let released: i64 = self
            .release_lease_script
            .key(lease_key(room_id))
            .arg(holder)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room_gate.store.redis",
                    error = %e,
                    room_id = %room_id,
                    "Failed to release room lease"
                );
                GateError::Store(format!("Failed to release room lease: {e}"))
            })?;

        if released == 0 {
            warn!(
                target: "room_gate.store.redis",
                room_id = %room_id,
                "Room lease expired before release"
            );
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), GateError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
