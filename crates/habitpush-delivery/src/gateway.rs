use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use habitpush_core::NotificationJob;

use crate::error::DeliveryError;

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Provider-assigned message id (FCM returns `projects/*/messages/*`).
    pub message_id: String,
}

/// Common interface implemented by every push transport.
///
/// Implementations must be `Send + Sync` so one instance can serve many
/// concurrent deliveries from the dispatcher's worker pool.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Stable lowercase identifier (e.g. `"fcm"`), used in logs and `/health`.
    fn name(&self) -> &str;

    /// Deliver one job to its token.
    ///
    /// `&self` so in-flight sends never contend for a mutable borrow. A failure
    /// here affects only this job.
    async fn send(&self, job: &NotificationJob) -> Result<Ack, DeliveryError>;
}
