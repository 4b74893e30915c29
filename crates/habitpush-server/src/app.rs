use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;

use habitpush_core::{config::HabitPushConfig, HabitEvent};
use habitpush_dispatch::Dispatcher;

/// Shared state handed to every handler as `Arc<AppState>`.
pub struct AppState {
    pub config: HabitPushConfig,
    pub dispatcher: Arc<Dispatcher>,
    /// Feeds entity-change events to the dispatch engine.
    pub events: mpsc::Sender<HabitEvent>,
}

impl AppState {
    pub fn new(
        config: HabitPushConfig,
        dispatcher: Arc<Dispatcher>,
        events: mpsc::Sender<HabitEvent>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            events,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/test-send", get(crate::http::test_send::test_send_handler))
        .route(
            "/triggers/habit-created",
            post(crate::http::triggers::habit_created_handler),
        )
        .route(
            "/triggers/habit-updated",
            post(crate::http::triggers::habit_updated_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Handler test fixtures: an in-memory store and a recording gateway.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{body::Body, http::Response};
    use serde_json::Value;

    use habitpush_core::{HabitId, NotificationJob, Recipient, RecipientId};
    use habitpush_delivery::{Ack, DeliveryError, PushGateway};
    use habitpush_dispatch::DispatchOptions;
    use habitpush_store::{HabitRow, HabitStore, StoreError};

    use super::*;

    #[derive(Default)]
    pub struct FakeStore {
        pub recipients: Mutex<HashMap<RecipientId, Recipient>>,
        pub broken: Mutex<bool>,
    }

    impl FakeStore {
        pub fn with_recipient(self, id: &str, token: Option<&str>) -> Self {
            self.recipients.lock().unwrap().insert(
                id.into(),
                Recipient {
                    id: id.into(),
                    display_name: None,
                    push_token: token.map(String::from),
                },
            );
            self
        }
    }

    #[async_trait]
    impl HabitStore for FakeStore {
        async fn list_recipients(&self) -> habitpush_store::Result<Vec<Recipient>> {
            Ok(self.recipients.lock().unwrap().values().cloned().collect())
        }

        async fn get_recipient(&self, id: &RecipientId) -> habitpush_store::Result<Option<Recipient>> {
            if *self.broken.lock().unwrap() {
                return Err(StoreError::Backend("store offline".to_string()));
            }
            Ok(self.recipients.lock().unwrap().get(id).cloned())
        }

        async fn list_habits(&self, _id: &RecipientId) -> habitpush_store::Result<Vec<HabitRow>> {
            Ok(Vec::new())
        }

        async fn mark_scheduled(
            &self,
            _recipient_id: &RecipientId,
            _habit_id: &HabitId,
            _summary: &str,
        ) -> habitpush_store::Result<()> {
            Ok(())
        }
    }

    /// Acks every job except those sent to the token "dead".
    pub struct FakeGateway;

    #[async_trait]
    impl PushGateway for FakeGateway {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, job: &NotificationJob) -> Result<Ack, DeliveryError> {
            if job.token == "dead" {
                return Err(DeliveryError::InvalidToken(job.token.clone()));
            }
            Ok(Ack {
                message_id: "fake-1".to_string(),
            })
        }
    }

    pub fn state_with(
        config: HabitPushConfig,
        store: FakeStore,
    ) -> (Arc<AppState>, mpsc::Receiver<HabitEvent>) {
        let dispatcher = Dispatcher::new(
            Arc::new(store),
            Arc::new(FakeGateway),
            DispatchOptions::default(),
        );
        let (tx, rx) = mpsc::channel(4);
        (
            Arc::new(AppState::new(config, Arc::new(dispatcher), tx)),
            rx,
        )
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
