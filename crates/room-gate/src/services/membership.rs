//! Membership Manager.
//!
//! Decides admission for one `(room, caller)` pair:
//!
//! 1. Load the room; absent rooms are `RoomNotFound`
//! 2. A presented credential already in `connected` is `AlreadyMember`
//! 3. A room at capacity is `RoomFull`
//! 4. Otherwise a seat is taken through the configured registrar
//!
//! Steps 2 and 3 never write; the registrar repeats both checks
//! against the state it writes from. A failed registration is retried once,
//! with the same candidate credential, before the error is surfaced. An
//! attempt whose write landed before its reply was lost is therefore
//! recognised on the retry instead of taking a second seat.

use crate::errors::GateError;
use crate::models::AdmitResult;
use crate::observability::metrics;
use crate::services::registration::{check_room, ParticipantRegistrar};
use crate::store::RoomStore;
use crate::token::TokenGenerator;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Membership Manager.
pub struct MembershipManager {
    store: Arc<dyn RoomStore>,
    registrar: Arc<dyn ParticipantRegistrar>,
    tokens: Arc<dyn TokenGenerator>,
    max_room_participants: usize,
}

impl MembershipManager {
    pub fn new(
        store: Arc<dyn RoomStore>,
        registrar: Arc<dyn ParticipantRegistrar>,
        tokens: Arc<dyn TokenGenerator>,
        max_room_participants: usize,
    ) -> Self {
        Self {
            store,
            registrar,
            tokens,
            max_room_participants,
        }
    }

    /// Admit a caller presenting `presented` (if any) to `room_id`.
    ///
    /// An empty presented credential is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns any store-class [`GateError`]; the caller must not be admitted.
    #[instrument(skip_all, fields(room_id = %room_id, has_credential = presented.is_some()))]
    pub async fn admit(
        &self,
        room_id: &str,
        presented: Option<&str>,
    ) -> Result<AdmitResult, GateError> {
        let presented = presented.filter(|token| !token.is_empty());

        let Some(room) = self.store.get_room(room_id).await? else {
            tracing::debug!(target: "room_gate.membership", room_id = %room_id, "Room not found");
            return Ok(AdmitResult::RoomNotFound);
        };

        if let Some(decided) = check_room(&room, presented, self.max_room_participants) {
            tracing::debug!(
                target: "room_gate.membership",
                room_id = %room_id,
                occupancy = room.occupancy(),
                outcome = decided.as_str(),
                "Admission decided without registration"
            );
            return Ok(decided);
        }

        let candidate = self.tokens.generate()?;

        match self.register(room_id, presented, &candidate).await {
            Ok(result) => Ok(result),
            Err(first) => {
                tracing::warn!(
                    target: "room_gate.membership",
                    room_id = %room_id,
                    error = %first,
                    "Registration failed, retrying once"
                );
                metrics::record_registration_retry(self.registrar.strategy().as_str());
                self.register(room_id, presented, &candidate).await
            }
        }
    }

    /// One timed registration attempt.
    async fn register(
        &self,
        room_id: &str,
        presented: Option<&str>,
        candidate: &str,
    ) -> Result<AdmitResult, GateError> {
        let start = Instant::now();
        let result = self
            .registrar
            .register_participant(room_id, presented, candidate)
            .await;

        let status = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        metrics::record_registration(
            self.registrar.strategy().as_str(),
            status,
            start.elapsed(),
        );

        if let Ok(AdmitResult::Admitted(_)) = &result {
            tracing::info!(
                target: "room_gate.membership",
                room_id = %room_id,
                strategy = self.registrar.strategy().as_str(),
                "Participant registered"
            );
        }

        result
    }
}
