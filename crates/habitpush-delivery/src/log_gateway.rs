use async_trait::async_trait;
use tracing::info;

use habitpush_core::NotificationJob;

use crate::{
    error::DeliveryError,
    gateway::{Ack, PushGateway},
};

/// Gateway that logs each job and acknowledges it without contacting a provider.
///
/// Default provider so a fresh install can run the full dispatch loop locally.
#[derive(Debug, Default)]
pub struct LogGateway;

impl LogGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushGateway for LogGateway {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, job: &NotificationJob) -> Result<Ack, DeliveryError> {
        let message_id = format!("log/{}", uuid::Uuid::new_v4());
        info!(
            recipient_id = %job.recipient_id,
            kind = %job.kind,
            title = %job.title,
            body = %job.body,
            %message_id,
            "push (log only)"
        );
        Ok(Ack { message_id })
    }
}
