//! `habitpush-delivery`: adapters over the push transport.
//!
//! | Gateway        | Behaviour                                            |
//! |----------------|------------------------------------------------------|
//! | [`FcmGateway`] | Firebase Cloud Messaging HTTP v1 `messages:send`      |
//! | [`LogGateway`] | Logs the job and acknowledges it; nothing leaves the host |

pub mod error;
pub mod fcm;
pub mod gateway;
pub mod log_gateway;
pub mod oauth;

use std::sync::Arc;
use std::time::Duration;

use habitpush_core::config::{DeliveryConfig, DeliveryProvider};

pub use error::DeliveryError;
pub use fcm::FcmGateway;
pub use gateway::{Ack, PushGateway};
pub use log_gateway::LogGateway;

/// Build the gateway selected by `config.provider`.
pub fn build_gateway(
    config: &DeliveryConfig,
    timeout: Duration,
) -> Result<Arc<dyn PushGateway>, DeliveryError> {
    match config.provider {
        DeliveryProvider::Fcm => {
            let fcm = config.fcm.as_ref().ok_or_else(|| {
                DeliveryError::Config("provider is fcm but [delivery.fcm] is missing".to_string())
            })?;
            Ok(Arc::new(FcmGateway::new(fcm, timeout)?))
        }
        DeliveryProvider::Log => Ok(Arc::new(LogGateway::new())),
    }
}
