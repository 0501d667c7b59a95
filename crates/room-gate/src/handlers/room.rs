//! Room entry handler.
//!
//! Sits behind the admission middleware, so every request reaching it has
//! been let through: admitted, already a member, or skipped by the
//! classifier. It reports which.

use crate::models::{RoomAdmission, RoomEntryResponse};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

/// Handler for GET /room/{id}
///
/// Returns 500 if reached without the admission middleware in front.
pub async fn room_entry(admission: Option<Extension<RoomAdmission>>) -> Response {
    let Some(Extension(admission)) = admission else {
        tracing::error!(target: "room_gate.handlers.room", "Room entry reached without admission");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    Json(RoomEntryResponse {
        room_id: admission.room_id,
        admission: admission.status,
    })
    .into_response()
}
