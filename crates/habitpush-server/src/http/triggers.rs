//! Entity-change ingress: POST /triggers/habit-created and /triggers/habit-updated.
//!
//! The store owner calls these after writing a habit. Events are queued for the
//! dispatch engine and handled one at a time; the response only acknowledges
//! receipt.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use habitpush_core::{HabitEvent, HabitId, HabitSnapshot, RecipientId};

use crate::app::AppState;
use crate::http::{auth_error, verify_bearer, verify_signature, ApiError};

#[derive(Debug, Deserialize)]
pub struct HabitCreatedRequest {
    pub recipient_id: RecipientId,
    pub habit_id: HabitId,
    pub habit: HabitSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct HabitUpdatedRequest {
    pub recipient_id: RecipientId,
    pub habit_id: HabitId,
    pub before: HabitSnapshot,
    pub after: HabitSnapshot,
}

pub async fn habit_created_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authenticate(&state, &headers, &body)?;
    let req: HabitCreatedRequest = parse(&body)?;
    enqueue(
        &state,
        HabitEvent::Created {
            recipient_id: req.recipient_id,
            habit_id: req.habit_id,
            habit: req.habit,
        },
    )
}

pub async fn habit_updated_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authenticate(&state, &headers, &body)?;
    let req: HabitUpdatedRequest = parse(&body)?;
    enqueue(
        &state,
        HabitEvent::Updated {
            recipient_id: req.recipient_id,
            habit_id: req.habit_id,
            before: req.before,
            after: req.after,
        },
    )
}

fn authenticate(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let server = &state.config.server;
    verify_bearer(headers, server.trigger_token.as_deref()).map_err(|e| auth_error(&e))?;
    verify_signature(headers, body, server.trigger_secret.as_deref()).map_err(|e| auth_error(&e))
}

fn parse<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "invalid trigger body");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "error": "invalid JSON body", "reason": e.to_string()})),
        )
    })
}

fn enqueue(state: &AppState, event: HabitEvent) -> Result<(StatusCode, Json<Value>), ApiError> {
    let recipient_id = event.recipient_id().clone();
    let habit_id = event.habit_id().clone();

    match state.events.try_send(event) {
        Ok(()) => {
            info!(%recipient_id, %habit_id, "habit event queued");
            Ok((StatusCode::ACCEPTED, Json(json!({"ok": true}))))
        }
        Err(TrySendError::Full(_)) => {
            warn!(%recipient_id, %habit_id, "event queue full, rejecting trigger");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"ok": false, "error": "event queue full"})),
            ))
        }
        Err(TrySendError::Closed(_)) => {
            warn!(%recipient_id, %habit_id, "dispatch engine stopped, rejecting trigger");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"ok": false, "error": "dispatch engine unavailable"})),
            ))
        }
    }
}
