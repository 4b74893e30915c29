//! GET /test-send?userId=...: send the fixed test push to one recipient.
//!
//! | Outcome                       | Status |
//! |-------------------------------|--------|
//! | id missing or blank           | 400    |
//! | recipient not found           | 404    |
//! | recipient has no push token   | 400    |
//! | delivered                     | 200    |
//! | delivery failed / store error | 500    |

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use habitpush_core::RecipientId;
use habitpush_dispatch::TestSendOutcome;

use crate::app::AppState;
use crate::http::{auth_error, verify_bearer};

#[derive(Debug, Deserialize)]
pub struct TestSendQuery {
    #[serde(rename = "userId", alias = "recipient_id")]
    pub user_id: Option<String>,
}

fn reply(status: StatusCode, body: Value) -> (StatusCode, Json<Value>) {
    (status, Json(body))
}

pub async fn test_send_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TestSendQuery>,
) -> (StatusCode, Json<Value>) {
    if let Err(reason) = verify_bearer(&headers, state.config.server.trigger_token.as_deref()) {
        return auth_error(&reason);
    }

    let Some(user_id) = query
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({"ok": false, "message": "userId is required"}),
        );
    };
    let recipient_id = RecipientId::from(user_id);

    match state.dispatcher.send_test(&recipient_id).await {
        Ok(TestSendOutcome::Delivered(ack)) => {
            info!(%recipient_id, message_id = %ack.message_id, "test-send delivered");
            reply(
                StatusCode::OK,
                json!({
                    "ok": true,
                    "message": "Test notification sent",
                    "message_id": ack.message_id,
                }),
            )
        }
        Ok(TestSendOutcome::RecipientMissing) => reply(
            StatusCode::NOT_FOUND,
            json!({"ok": false, "message": "User not found"}),
        ),
        Ok(TestSendOutcome::NoToken) => reply(
            StatusCode::BAD_REQUEST,
            json!({"ok": false, "message": "User has no push token"}),
        ),
        Ok(TestSendOutcome::DeliveryFailed(e)) => {
            warn!(%recipient_id, code = e.code(), error = %e, "test-send delivery failed");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"ok": false, "message": format!("Delivery failed: {e}"), "code": e.code()}),
            )
        }
        Err(e) => {
            error!(%recipient_id, error = %e, "test-send lookup failed");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"ok": false, "message": "internal error"}),
            )
        }
    }
}
