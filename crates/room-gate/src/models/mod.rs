//! Room gate models.
//!
//! Contains data types shared between the store, services and handlers.

use serde::{Deserialize, Serialize};

/// Room record as held in the room store.
///
/// Rooms are created and expired by an external collaborator; the gate only
/// reads them and appends to `connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    /// Admitted credential tokens in admission order.
    pub connected: Vec<String>,

    /// Creation timestamp (opaque to the gate).
    pub created_at: i64,
}

impl RoomRecord {
    /// Whether `token` is one of the admitted credentials.
    pub fn has_member(&self, token: &str) -> bool {
        self.connected.iter().any(|t| t == token)
    }

    /// Number of occupied seats.
    pub fn occupancy(&self) -> usize {
        self.connected.len()
    }
}

/// Outcome of an admission decision for one request.
///
/// Also the outcome of a registration attempt: registrars re-check
/// membership and existence against the state they write from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitResult {
    /// A new seat was taken; the token must be sent back as the credential.
    Admitted(String),
    /// The presented credential is already listed for the room.
    AlreadyMember,
    /// The room is at capacity.
    RoomFull,
    /// The room does not exist.
    RoomNotFound,
}

impl AdmitResult {
    /// Bounded label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmitResult::Admitted(_) => "admitted",
            AdmitResult::AlreadyMember => "already_member",
            AdmitResult::RoomFull => "room_full",
            AdmitResult::RoomNotFound => "room_not_found",
        }
    }
}

/// How a request that reached the room entry was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Admitted,
    AlreadyMember,
    Skipped,
}

/// Request extension inserted by the admission middleware on pass-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAdmission {
    pub room_id: String,
    pub status: AdmissionStatus,
}

/// Room entry response.
///
/// Returned by `/room/{id}` once the request has been let through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEntryResponse {
    pub room_id: String,
    pub admission: AdmissionStatus,
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Room store connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_record_membership() {
        let room = RoomRecord {
            connected: vec!["tok1".to_string(), "tok2".to_string()],
            created_at: 1_712_000_000_000,
        };

        assert!(room.has_member("tok1"));
        assert!(!room.has_member("tok3"));
        assert!(!room.has_member(""));
        assert_eq!(room.occupancy(), 2);
    }

    #[test]
    fn test_admit_result_labels() {
        assert_eq!(AdmitResult::Admitted("t".to_string()).as_str(), "admitted");
        assert_eq!(AdmitResult::AlreadyMember.as_str(), "already_member");
        assert_eq!(AdmitResult::RoomFull.as_str(), "room_full");
        assert_eq!(AdmitResult::RoomNotFound.as_str(), "room_not_found");
    }

    #[test]
    fn test_room_entry_response_serialization() {
        let response = RoomEntryResponse {
            room_id: "r1".to_string(),
            admission: AdmissionStatus::AlreadyMember,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"room_id\":\"r1\""));
        assert!(json.contains("\"admission\":\"already_member\""));
    }

    #[test]
    fn test_readiness_response_omits_empty_fields() {
        let ready = ReadinessResponse {
            status: "ready",
            store: Some("healthy"),
            error: None,
        };

        let json = serde_json::to_string(&ready).unwrap();
        assert!(json.contains("\"store\":\"healthy\""));
        assert!(!json.contains("error"));
    }
}
