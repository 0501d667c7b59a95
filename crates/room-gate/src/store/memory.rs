//! In-process room store.
//!
//! Keeps room hashes in memory with the same field encoding and the same
//! conditional-write semantics as the Redis store. Selected with
//! `REDIS_URL=memory://` for local development, and used by tests.
//!
//! Every operation yields to the scheduler after taking its snapshot, the way
//! a network round trip would. A caller that reads, checks and then writes
//! in separate calls can therefore interleave with other tasks, which is
//! what the registration strategies are tested against.

use crate::errors::GateError;
use crate::models::RoomRecord;
use crate::store::{
    decode_room, encode_connected, AppendOutcome, CasOutcome, RoomStore, CONNECTED_FIELD,
    CREATED_AT_FIELD,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    /// Room hashes keyed by room id.
    rooms: HashMap<String, HashMap<String, String>>,
    /// Lease holder and expiry keyed by room id.
    leases: HashMap<String, (String, Instant)>,
}

/// In-memory room store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoomStore {
    inner: Arc<Mutex<Inner>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with the given members (builder style).
    #[must_use]
    pub fn with_room(self, room_id: &str, connected: &[&str], created_at: i64) -> Self {
        let connected: Vec<String> = connected.iter().map(|s| (*s).to_string()).collect();
        self.insert_room(room_id, &connected, created_at);
        self
    }

    /// Create or overwrite a room.
    pub fn insert_room(&self, room_id: &str, connected: &[String], created_at: i64) {
        let encoded = serde_json::to_string(connected).unwrap_or_else(|_| "[]".to_string());
        self.insert_raw_fields(
            room_id,
            HashMap::from([
                (CONNECTED_FIELD.to_string(), encoded),
                (CREATED_AT_FIELD.to_string(), created_at.to_string()),
            ]),
        );
    }

    /// Store a room hash verbatim, e.g. a record with missing fields.
    pub fn insert_raw_fields(&self, room_id: &str, fields: HashMap<String, String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rooms.insert(room_id.to_string(), fields);
        }
    }

    /// Remove a room, as an external expiry would.
    pub fn remove_room(&self, room_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rooms.remove(room_id);
        }
    }

    /// Current `connected` value, decoded. `None` if absent or undecodable.
    pub fn connected(&self, room_id: &str) -> Option<Vec<String>> {
        let inner = self.inner.lock().ok()?;
        let raw = inner.rooms.get(room_id)?.get(CONNECTED_FIELD)?;
        serde_json::from_str(raw).ok()
    }

    /// Number of room reads served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `connected` writes applied.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, GateError> {
        self.inner
            .lock()
            .map_err(|_| GateError::Store("in-memory store lock poisoned".to_string()))
    }

    /// Decode `connected` for a room that exists.
    fn current_connected(
        room_id: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Vec<String>, GateError> {
        let raw = fields.get(CONNECTED_FIELD).ok_or_else(|| {
            GateError::MalformedState(format!("room {room_id} has no {CONNECTED_FIELD} field"))
        })?;
        serde_json::from_str(raw).map_err(|e| {
            GateError::MalformedState(format!(
                "room {room_id} has undecodable {CONNECTED_FIELD}: {e}"
            ))
        })
    }

    fn write_connected(
        &self,
        fields: &mut HashMap<String, String>,
        connected: &[String],
    ) -> Result<(), GateError> {
        fields.insert(CONNECTED_FIELD.to_string(), encode_connected(connected)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, GateError> {
        let snapshot = {
            let inner = self.lock()?;
            inner.rooms.get(room_id).cloned()
        };
        self.reads.fetch_add(1, Ordering::SeqCst);

        tokio::task::yield_now().await;

        match snapshot {
            Some(fields) => decode_room(room_id, &fields).map(Some),
            None => Ok(None),
        }
    }

    async fn set_connected(&self, room_id: &str, connected: &[String]) -> Result<bool, GateError> {
        tokio::task::yield_now().await;

        let mut inner = self.lock()?;
        let Some(fields) = inner.rooms.get_mut(room_id) else {
            return Ok(false);
        };
        self.write_connected(fields, connected)?;
        Ok(true)
    }

    async fn append_if_below(
        &self,
        room_id: &str,
        presented: Option<&str>,
        token: &str,
        max: usize,
    ) -> Result<AppendOutcome, GateError> {
        tokio::task::yield_now().await;

        let mut inner = self.lock()?;
        let Some(fields) = inner.rooms.get_mut(room_id) else {
            return Ok(AppendOutcome::NotFound);
        };

        let mut connected = Self::current_connected(room_id, fields)?;

        if connected.iter().any(|t| t == token) {
            return Ok(AppendOutcome::Appended);
        }

        if let Some(presented) = presented.filter(|p| !p.is_empty()) {
            if connected.iter().any(|t| t == presented) {
                return Ok(AppendOutcome::AlreadyMember);
            }
        }

        if connected.len() >= max {
            return Ok(AppendOutcome::Full);
        }

        connected.push(token.to_string());
        self.write_connected(fields, &connected)?;
        Ok(AppendOutcome::Appended)
    }

    async fn compare_and_swap_connected(
        &self,
        room_id: &str,
        expected: &[String],
        replacement: &[String],
    ) -> Result<CasOutcome, GateError> {
        tokio::task::yield_now().await;

        let mut inner = self.lock()?;
        let Some(fields) = inner.rooms.get_mut(room_id) else {
            return Ok(CasOutcome::NotFound);
        };

        if Self::current_connected(room_id, fields)? != expected {
            return Ok(CasOutcome::Conflict);
        }

        self.write_connected(fields, replacement)?;
        Ok(CasOutcome::Swapped)
    }

    async fn acquire_lease(
        &self,
        room_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, GateError> {
        tokio::task::yield_now().await;

        let now = Instant::now();
        let mut inner = self.lock()?;

        if let Some((_, expires_at)) = inner.leases.get(room_id) {
            if *expires_at > now {
                return Ok(false);
            }
        }

        inner
            .leases
            .insert(room_id.to_string(), (holder.to_string(), now + ttl));
        Ok(true)
    }

    async fn release_lease(&self, room_id: &str, holder: &str) -> Result<(), GateError> {
        let mut inner = self.lock()?;
        if inner
            .leases
            .get(room_id)
            .is_some_and(|(current, _)| current == holder)
        {
            inner.leases.remove(room_id);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), GateError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_room_round_trips_inserted_room() {
        let store = InMemoryRoomStore::new().with_room("r1", &["a"], 42);

        let room = store.get_room("r1").await.unwrap().unwrap();
        assert_eq!(room.connected, vec!["a"]);
        assert_eq!(room.created_at, 42);
        assert!(store.get_room("missing").await.unwrap().is_none());
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_get_room_reports_malformed_record() {
        let store = InMemoryRoomStore::new();
        store.insert_raw_fields(
            "r1",
            HashMap::from([(CREATED_AT_FIELD.to_string(), "1".to_string())]),
        );

        let result = store.get_room("r1").await;
        assert!(matches!(result, Err(GateError::MalformedState(_))));
    }

    #[tokio::test]
    async fn test_append_if_below() {
        let store = InMemoryRoomStore::new().with_room("r1", &["a", "b"], 0);

        assert_eq!(
            store.append_if_below("r1", None, "c", 3).await.unwrap(),
            AppendOutcome::Appended
        );
        assert_eq!(
            store.append_if_below("r1", None, "d", 3).await.unwrap(),
            AppendOutcome::Full
        );
        assert_eq!(
            store.append_if_below("r1", Some("b"), "e", 3).await.unwrap(),
            AppendOutcome::AlreadyMember
        );
        assert_eq!(
            store.append_if_below("nope", None, "f", 3).await.unwrap(),
            AppendOutcome::NotFound
        );
        assert_eq!(store.connected("r1").unwrap(), strings(&["a", "b", "c"]));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_append_of_listed_token_does_not_write_again() {
        let store = InMemoryRoomStore::new().with_room("r1", &["a", "b", "c"], 0);

        assert_eq!(
            store.append_if_below("r1", None, "c", 3).await.unwrap(),
            AppendOutcome::Appended
        );
        assert_eq!(store.connected("r1").unwrap(), strings(&["a", "b", "c"]));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_presented_token_is_ignored() {
        let store = InMemoryRoomStore::new().with_room("r1", &[], 0);

        assert_eq!(
            store.append_if_below("r1", Some(""), "a", 3).await.unwrap(),
            AppendOutcome::Appended
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = InMemoryRoomStore::new().with_room("r1", &["a"], 0);

        let conflict = store
            .compare_and_swap_connected("r1", &[], &strings(&["x"]))
            .await
            .unwrap();
        assert_eq!(conflict, CasOutcome::Conflict);

        let swapped = store
            .compare_and_swap_connected("r1", &strings(&["a"]), &strings(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(swapped, CasOutcome::Swapped);
        assert_eq!(store.connected("r1").unwrap(), strings(&["a", "b"]));

        let missing = store
            .compare_and_swap_connected("nope", &[], &strings(&["x"]))
            .await
            .unwrap();
        assert_eq!(missing, CasOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_set_connected_does_not_resurrect_room() {
        let store = InMemoryRoomStore::new();

        assert!(!store.set_connected("gone", &strings(&["a"])).await.unwrap());
        assert!(store.get_room("gone").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_exclusion_and_expiry() {
        let store = InMemoryRoomStore::new();
        let ttl = Duration::from_millis(100);

        assert!(store.acquire_lease("r1", "h1", ttl).await.unwrap());
        assert!(!store.acquire_lease("r1", "h2", ttl).await.unwrap());

        // A non-holder cannot release
        store.release_lease("r1", "h2").await.unwrap();
        assert!(!store.acquire_lease("r1", "h2", ttl).await.unwrap());

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(store.acquire_lease("r1", "h2", ttl).await.unwrap());

        store.release_lease("r1", "h2").await.unwrap();
        assert!(store.acquire_lease("r1", "h3", ttl).await.unwrap());
    }
}
