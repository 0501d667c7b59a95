//! Participant registration strategies.
//!
//! Registration is the only write the gate performs: append a freshly
//! issued credential to a room's `connected` list, unless the room is full.
//! Reading, checking and writing in separate store calls lets two callers
//! both pass the capacity check against the same snapshot, so every
//! strategy here closes that window in a different way:
//!
//! - [`AtomicAppendRegistrar`] - one conditional-append command evaluated
//!   by the store (Lua script on Redis)
//! - [`OptimisticRegistrar`] - read, check, compare-and-swap the whole
//!   `connected` value, retry on conflict
//! - [`LeaseRegistrar`] - per-room lease held across read, check and write
//!
//! Each strategy re-checks membership of the presented credential against
//! the state it writes from, so a caller whose token was appended by a
//! concurrent request is recognised rather than given a second seat.
//!
//! The credential to append (the candidate) is issued by the caller and
//! stays the same across retries. A candidate already listed in the room is
//! reported as `Admitted` without a second write, so repeating an attempt
//! whose write landed but whose reply was lost cannot take another seat.

use crate::config::{Config, RegistrationStrategy};
use crate::errors::GateError;
use crate::models::{AdmitResult, RoomRecord};
use crate::observability::metrics;
use crate::store::{AppendOutcome, CasOutcome, RoomStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

/// Delay between attempts to take a held room lease.
const LEASE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Registers a new participant against a room's shared state.
#[async_trait]
pub trait ParticipantRegistrar: Send + Sync {
    /// Strategy implemented by this registrar.
    fn strategy(&self) -> RegistrationStrategy;

    /// Take a seat in `room_id` for `candidate`, on behalf of a caller
    /// presenting `presented`.
    ///
    /// Returns `Admitted(candidate)` once the candidate is listed (including
    /// when an earlier attempt already listed it), `AlreadyMember` if
    /// `presented` is listed in the state written from, `RoomFull` if no
    /// seat is left, or `RoomNotFound` if the room disappeared since it was
    /// last read.
    async fn register_participant(
        &self,
        room_id: &str,
        presented: Option<&str>,
        candidate: &str,
    ) -> Result<AdmitResult, GateError>;
}

/// Decide a request against a room snapshot without writing.
///
/// Membership is checked before capacity so a returning participant is
/// never turned away from a room that filled up after they joined.
/// Returns `None` when a new seat should be taken.
pub fn check_room(room: &RoomRecord, presented: Option<&str>, max: usize) -> Option<AdmitResult> {
    if presented.is_some_and(|token| room.has_member(token)) {
        return Some(AdmitResult::AlreadyMember);
    }

    if room.occupancy() >= max {
        return Some(AdmitResult::RoomFull);
    }

    None
}

/// [`check_room`] for a registration attempt carrying `candidate`.
fn check_attempt(
    room: &RoomRecord,
    presented: Option<&str>,
    candidate: &str,
    max: usize,
) -> Option<AdmitResult> {
    if room.has_member(candidate) {
        return Some(AdmitResult::Admitted(candidate.to_string()));
    }

    check_room(room, presented, max)
}

/// Build the registrar selected by `config.registration_strategy`.
pub fn build_registrar(config: &Config, store: Arc<dyn RoomStore>) -> Arc<dyn ParticipantRegistrar> {
    let max = config.max_room_participants;

    match config.registration_strategy {
        RegistrationStrategy::AtomicAppend => Arc::new(AtomicAppendRegistrar::new(store, max)),
        RegistrationStrategy::Optimistic => Arc::new(OptimisticRegistrar::new(
            store,
            max,
            config.optimistic_max_attempts,
        )),
        RegistrationStrategy::Lease => Arc::new(LeaseRegistrar::new(
            store,
            max,
            Duration::from_millis(config.room_lease_ttl_ms),
            Duration::from_millis(config.room_lease_wait_ms),
        )),
    }
}

// ============================================================================
// Atomic append
// ============================================================================

/// Registration through the store's conditional-append primitive.
pub struct AtomicAppendRegistrar {
    store: Arc<dyn RoomStore>,
    max_room_participants: usize,
}

impl AtomicAppendRegistrar {
    pub fn new(store: Arc<dyn RoomStore>, max_room_participants: usize) -> Self {
        Self {
            store,
            max_room_participants,
        }
    }
}

#[async_trait]
impl ParticipantRegistrar for AtomicAppendRegistrar {
    fn strategy(&self) -> RegistrationStrategy {
        RegistrationStrategy::AtomicAppend
    }

    #[instrument(skip_all, fields(room_id = %room_id, strategy = "atomic"))]
    async fn register_participant(
        &self,
        room_id: &str,
        presented: Option<&str>,
        candidate: &str,
    ) -> Result<AdmitResult, GateError> {
        let outcome = self
            .store
            .append_if_below(room_id, presented, candidate, self.max_room_participants)
            .await?;

        Ok(match outcome {
            AppendOutcome::Appended => AdmitResult::Admitted(candidate.to_string()),
            AppendOutcome::AlreadyMember => AdmitResult::AlreadyMember,
            AppendOutcome::Full => AdmitResult::RoomFull,
            AppendOutcome::NotFound => AdmitResult::RoomNotFound,
        })
    }
}

// ============================================================================
// Optimistic compare-and-swap
// ============================================================================

/// Registration through a compare-and-swap retry loop on `connected`.
pub struct OptimisticRegistrar {
    store: Arc<dyn RoomStore>,
    max_room_participants: usize,
    max_attempts: u32,
}

impl OptimisticRegistrar {
    pub fn new(store: Arc<dyn RoomStore>, max_room_participants: usize, max_attempts: u32) -> Self {
        Self {
            store,
            max_room_participants,
            max_attempts,
        }
    }
}

#[async_trait]
impl ParticipantRegistrar for OptimisticRegistrar {
    fn strategy(&self) -> RegistrationStrategy {
        RegistrationStrategy::Optimistic
    }

    #[instrument(skip_all, fields(room_id = %room_id, strategy = "optimistic"))]
    async fn register_participant(
        &self,
        room_id: &str,
        presented: Option<&str>,
        candidate: &str,
    ) -> Result<AdmitResult, GateError> {
        for attempt in 1..=self.max_attempts {
            let Some(room) = self.store.get_room(room_id).await? else {
                return Ok(AdmitResult::RoomNotFound);
            };

            if let Some(decided) =
                check_attempt(&room, presented, candidate, self.max_room_participants)
            {
                return Ok(decided);
            }

            let mut replacement = room.connected.clone();
            replacement.push(candidate.to_string());

            match self
                .store
                .compare_and_swap_connected(room_id, &room.connected, &replacement)
                .await?
            {
                CasOutcome::Swapped => return Ok(AdmitResult::Admitted(candidate.to_string())),
                CasOutcome::NotFound => return Ok(AdmitResult::RoomNotFound),
                CasOutcome::Conflict => {
                    tracing::debug!(
                        target: "room_gate.registration",
                        room_id = %room_id,
                        attempt = attempt,
                        "Room changed since read, retrying"
                    );
                    metrics::record_registration_retry(self.strategy().as_str());
                }
            }
        }

        tracing::warn!(
            target: "room_gate.registration",
            room_id = %room_id,
            max_attempts = self.max_attempts,
            "Optimistic registration exhausted its attempts"
        );
        Err(GateError::Contention(format!(
            "room {room_id} changed on every one of {} attempts",
            self.max_attempts
        )))
    }
}

// ============================================================================
// Per-room lease
// ============================================================================

/// Registration under a per-room mutual-exclusion lease.
///
/// The lease expires after `lease_ttl` even if never released, so a crashed
/// holder cannot wedge a room. A holder that outlives its lease loses
/// exclusion; `lease_ttl` must comfortably exceed one read plus one write.
pub struct LeaseRegistrar {
    store: Arc<dyn RoomStore>,
    max_room_participants: usize,
    lease_ttl: Duration,
    lease_wait: Duration,
}

impl LeaseRegistrar {
    pub fn new(
        store: Arc<dyn RoomStore>,
        max_room_participants: usize,
        lease_ttl: Duration,
        lease_wait: Duration,
    ) -> Self {
        Self {
            store,
            max_room_participants,
            lease_ttl,
            lease_wait,
        }
    }

    /// Poll for the room lease until `lease_wait` elapses.
    async fn acquire(&self, room_id: &str, holder: &str) -> Result<(), GateError> {
        let deadline = Instant::now() + self.lease_wait;

        loop {
            if self
                .store
                .acquire_lease(room_id, holder, self.lease_ttl)
                .await?
            {
                return Ok(());
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    target: "room_gate.registration",
                    room_id = %room_id,
                    wait_ms = self.lease_wait.as_millis() as u64,
                    "Timed out waiting for room lease"
                );
                return Err(GateError::Contention(format!(
                    "room {room_id} lease not obtained in time"
                )));
            }

            metrics::record_registration_retry(self.strategy().as_str());
            tokio::time::sleep(LEASE_POLL_INTERVAL).await;
        }
    }

    /// Read, check and write while holding the lease.
    async fn register_locked(
        &self,
        room_id: &str,
        presented: Option<&str>,
        candidate: &str,
    ) -> Result<AdmitResult, GateError> {
        let Some(room) = self.store.get_room(room_id).await? else {
            return Ok(AdmitResult::RoomNotFound);
        };

        if let Some(decided) = check_attempt(&room, presented, candidate, self.max_room_participants)
        {
            return Ok(decided);
        }

        let mut connected = room.connected;
        connected.push(candidate.to_string());

        if !self.store.set_connected(room_id, &connected).await? {
            return Ok(AdmitResult::RoomNotFound);
        }

        Ok(AdmitResult::Admitted(candidate.to_string()))
    }
}

#[async_trait]
impl ParticipantRegistrar for LeaseRegistrar {
    fn strategy(&self) -> RegistrationStrategy {
        RegistrationStrategy::Lease
    }

    #[instrument(skip_all, fields(room_id = %room_id, strategy = "lease"))]
    async fn register_participant(
        &self,
        room_id: &str,
        presented: Option<&str>,
        candidate: &str,
    ) -> Result<AdmitResult, GateError> {
        let holder = uuid::Uuid::new_v4().to_string();
        self.acquire(room_id, &holder).await?;

        let result = self.register_locked(room_id, presented, candidate).await;

        // The lease expires on its own; a failed release only delays the next holder
        if let Err(e) = self.store.release_lease(room_id, &holder).await {
            tracing::warn!(
                target: "room_gate.registration",
                room_id = %room_id,
                error = %e,
                "Failed to release room lease"
            );
        }

        result
    }
}

/// Mock registrar for unit testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Registrar that replays scripted results in call order.
    ///
    /// Once the script is exhausted every call returns `RoomFull`.
    pub struct MockRegistrar {
        script: Mutex<Vec<Result<AdmitResult, GateError>>>,
        candidates: Mutex<Vec<String>>,
        call_count: AtomicUsize,
    }

    impl MockRegistrar {
        /// Create a mock returning `results` in order.
        pub fn with_results(results: Vec<Result<AdmitResult, GateError>>) -> Self {
            let mut script = results;
            script.reverse();
            Self {
                script: Mutex::new(script),
                candidates: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Create a mock that always fails with a store error.
        pub fn failing(times: usize) -> Self {
            Self::with_results(
                (0..times)
                    .map(|_| Err(GateError::Store("mock registrar failure".to_string())))
                    .collect(),
            )
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Candidate credentials received, in call order.
        pub fn candidates(&self) -> Vec<String> {
            self.candidates
                .lock()
                .map(|candidates| candidates.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ParticipantRegistrar for MockRegistrar {
        fn strategy(&self) -> RegistrationStrategy {
            RegistrationStrategy::AtomicAppend
        }

        async fn register_participant(
            &self,
            _room_id: &str,
            _presented: Option<&str>,
            candidate: &str,
        ) -> Result<AdmitResult, GateError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut candidates) = self.candidates.lock() {
                candidates.push(candidate.to_string());
            }

            let next = self
                .script
                .lock()
                .map_err(|_| GateError::Store("mock registrar lock poisoned".to_string()))?
                .pop();

            next.unwrap_or(Ok(AdmitResult::RoomFull))
        }
    }
}
