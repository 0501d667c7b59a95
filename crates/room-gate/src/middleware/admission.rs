//! Admission middleware for room paths.
//!
//! Runs in front of every `/room` route:
//!
//! 1. Paths other than `/room/<id>` redirect to `/`
//! 2. Automated agents and prefetches pass through untouched (no store access)
//! 3. Everyone else goes through the Membership Manager; outcomes map to
//!    a pass-through (with a fresh credential cookie when admitted) or a
//!    `307 Temporary Redirect` to a reason-marked destination
//!
//! The handler behind the middleware finds a [`RoomAdmission`] in the
//! request extensions describing how the request was let through.

use crate::classifier::{Classification, RequestSignals};
use crate::errors::GateError;
use crate::models::{AdmissionStatus, AdmitResult, RoomAdmission};
use crate::observability::metrics;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// Cookie carrying the membership credential.
pub const CREDENTIAL_COOKIE: &str = "x-auth-token";

/// Redirect when the path does not name a room.
pub const HOME_REDIRECT: &str = "/";

/// Redirect when the room does not exist.
pub const ROOM_NOT_FOUND_REDIRECT: &str = "/?error=room-not-found";

/// Redirect when the room is at capacity.
pub const ROOM_FULL_REDIRECT: &str = "/?error=room-full";

/// Extract the room id from a `/room/<id>` path.
///
/// The id is a single non-empty segment; anything else yields `None`.
pub fn parse_room_path(path: &str) -> Option<&str> {
    let room_id = path.strip_prefix("/room/")?;
    if room_id.is_empty() || room_id.contains('/') {
        return None;
    }
    Some(room_id)
}

/// Read the credential cookie from the request, ignoring empty values.
pub fn presented_credential(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| name.trim() == CREDENTIAL_COOKIE && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

/// Build the `Set-Cookie` value for a newly issued credential.
///
/// Site-wide, hidden from scripts, never sent cross-site, and restricted to
/// HTTPS when `secure` is set.
pub fn credential_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!("{CREDENTIAL_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Admission middleware.
///
/// # Response
///
/// - 307 to `/` if the path is not `/room/<id>`
/// - 307 to `/?error=room-not-found` or `/?error=room-full`
/// - 307 to the configured error destination on store-class failures
/// - Continues to the next handler otherwise, with `RoomAdmission` in extensions
#[instrument(skip_all, name = "room_gate.middleware.admission")]
pub async fn gate_room(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let Some(room_id) = parse_room_path(req.uri().path()).map(str::to_string) else {
        tracing::debug!(target: "room_gate.middleware.admission", "Path does not name a room");
        metrics::record_admission("invalid_path");
        return Redirect::temporary(HOME_REDIRECT).into_response();
    };

    let signals = RequestSignals::from_headers(req.headers());
    if let Classification::Skip(reason) = state.classifier.classify(&signals) {
        tracing::debug!(
            target: "room_gate.middleware.admission",
            room_id = %room_id,
            reason = reason.as_str(),
            "Skipping admission for non-participant request"
        );
        metrics::record_admission(&format!("skipped_{}", reason.as_str()));
        req.extensions_mut().insert(RoomAdmission {
            room_id,
            status: AdmissionStatus::Skipped,
        });
        return next.run(req).await;
    }

    let presented = presented_credential(req.headers());

    // Detached so a client disconnect cannot drop the registration mid-write
    let membership = state.membership.clone();
    let task_room_id = room_id.clone();
    let outcome = tokio::spawn(async move {
        membership
            .admit(&task_room_id, presented.as_deref())
            .await
    })
    .await
    .unwrap_or_else(|e| Err(GateError::Store(format!("admission task failed: {e}"))));

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(
                target: "room_gate.middleware.admission",
                room_id = %room_id,
                error = %e,
                kind = e.kind(),
                "Admission failed"
            );
            metrics::record_admission(&format!("error_{}", e.kind()));
            return Redirect::temporary(&state.config.store_error_redirect).into_response();
        }
    };

    metrics::record_admission(result.as_str());

    match result {
        AdmitResult::Admitted(token) => {
            req.extensions_mut().insert(RoomAdmission {
                room_id: room_id.clone(),
                status: AdmissionStatus::Admitted,
            });

            let mut response = next.run(req).await;
            let cookie = credential_cookie(&token, state.config.environment.is_production());
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => {
                    tracing::error!(
                        target: "room_gate.middleware.admission",
                        room_id = %room_id,
                        error = %e,
                        "Issued credential is not a valid header value"
                    );
                }
            }
            response
        }
        AdmitResult::AlreadyMember => {
            req.extensions_mut().insert(RoomAdmission {
                room_id,
                status: AdmissionStatus::AlreadyMember,
            });
            next.run(req).await
        }
        AdmitResult::RoomFull => Redirect::temporary(ROOM_FULL_REDIRECT).into_response(),
        AdmitResult::RoomNotFound => Redirect::temporary(ROOM_NOT_FOUND_REDIRECT).into_response(),
    }
}
