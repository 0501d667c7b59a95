//! Fault-injecting room store.
//!
//! Wraps another store and fails selected operations with
//! `GateError::Store`, the way a dropped Redis connection would.

use async_trait::async_trait;
use room_gate::errors::GateError;
use room_gate::models::RoomRecord;
use room_gate::store::{AppendOutcome, CasOutcome, RoomStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Room store wrapper that injects failures.
///
/// - `fail_next_writes(n)` fails the next `n` registration writes
///   (`append_if_below`, `compare_and_swap_connected`, `set_connected`)
///   without applying them
/// - `lose_next_write_replies(n)` applies the next `n` registration writes
///   but reports them as failed, like a connection reset after the command ran
/// - `set_unavailable(true)` fails every operation, including reads and pings
pub struct FlakyRoomStore {
    inner: Arc<dyn RoomStore>,
    writes_to_fail: AtomicUsize,
    replies_to_lose: AtomicUsize,
    unavailable: AtomicBool,
    failed: AtomicUsize,
}

impl FlakyRoomStore {
    pub fn new(inner: Arc<dyn RoomStore>) -> Self {
        Self {
            inner,
            writes_to_fail: AtomicUsize::new(0),
            replies_to_lose: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            failed: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` registration writes.
    pub fn fail_next_writes(&self, n: usize) {
        self.writes_to_fail.store(n, Ordering::SeqCst);
    }

    /// Apply the next `n` registration writes, then report them as failed.
    pub fn lose_next_write_replies(&self, n: usize) {
        self.replies_to_lose.store(n, Ordering::SeqCst);
    }

    /// Fail every operation until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of operations failed so far.
    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn check_available(&self, operation: &str) -> Result<(), GateError> {
        if self.unavailable.load(Ordering::SeqCst) {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(GateError::Store(format!("injected failure: {operation}")));
        }
        Ok(())
    }

    fn check_write(&self, operation: &str) -> Result<(), GateError> {
        self.check_available(operation)?;

        let consumed = self
            .writes_to_fail
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(GateError::Store(format!("injected failure: {operation}")));
        }
        Ok(())
    }

    fn check_reply<T>(
        &self,
        operation: &str,
        result: Result<T, GateError>,
    ) -> Result<T, GateError> {
        let value = result?;

        let lost = self
            .replies_to_lose
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(GateError::Store(format!(
                "injected lost reply: {operation}"
            )));
        }
        Ok(value)
    }
}

#[async_trait]
impl RoomStore for FlakyRoomStore {
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, GateError> {
        self.check_available("get_room")?;
        self.inner.get_room(room_id).await
    }

    async fn set_connected(&self, room_id: &str, connected: &[String]) -> Result<bool, GateError> {
        self.check_write("set_connected")?;
        let result = self.inner.set_connected(room_id, connected).await;
        self.check_reply("set_connected", result)
    }

    async fn append_if_below(
        &self,
        room_id: &str,
        presented: Option<&str>,
        token: &str,
        max: usize,
    ) -> Result<AppendOutcome, GateError> {
        self.check_write("append_if_below")?;
        let result = self
            .inner
            .append_if_below(room_id, presented, token, max)
            .await;
        self.check_reply("append_if_below", result)
    }

    async fn compare_and_swap_connected(
        &self,
        room_id: &str,
        expected: &[String],
        replacement: &[String],
    ) -> Result<CasOutcome, GateError> {
        self.check_write("compare_and_swap_connected")?;
        let result = self
            .inner
            .compare_and_swap_connected(room_id, expected, replacement)
            .await;
        self.check_reply("compare_and_swap_connected", result)
    }

    async fn acquire_lease(
        &self,
        room_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, GateError> {
        self.check_available("acquire_lease")?;
        self.inner.acquire_lease(room_id, holder, ttl).await
    }

    async fn release_lease(&self, room_id: &str, holder: &str) -> Result<(), GateError> {
        self.check_available("release_lease")?;
        self.inner.release_lease(room_id, holder).await
    }

    async fn ping(&self) -> Result<(), GateError> {
        self.check_available("ping")?;
        self.inner.ping().await
    }
}
