use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use habitpush_core::config::FcmConfig;
use habitpush_core::NotificationJob;

use crate::{
    error::DeliveryError,
    gateway::{Ack, PushGateway},
    oauth::TokenSource,
};

const USER_AGENT: &str = concat!("habitpush/", env!("CARGO_PKG_VERSION"));

/// FCM error codes that mean the token itself is dead.
const DEAD_TOKEN_CODES: [&str; 2] = ["UNREGISTERED", "SENDER_ID_MISMATCH"];

/// Firebase Cloud Messaging HTTP v1 gateway.
///
/// Each send carries a bearer token from [`TokenSource`], so a service-account
/// token is refreshed in place instead of expiring an hour after startup.
pub struct FcmGateway {
    client: reqwest::Client,
    endpoint: String,
    auth: TokenSource,
    timeout_ms: u64,
}

impl FcmGateway {
    /// `timeout` bounds each request end to end.
    pub fn new(config: &FcmConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        if config.project_id.trim().is_empty() {
            return Err(DeliveryError::Config("fcm.project_id is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        let auth = TokenSource::from_config(config, client.clone())?;
        Ok(Self {
            client,
            endpoint: endpoint(&config.base_url, &config.project_id),
            auth,
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

fn endpoint(base_url: &str, project_id: &str) -> String {
    format!(
        "{}/v1/projects/{}/messages:send",
        base_url.trim_end_matches('/'),
        project_id
    )
}

/// `{"message": {...}}` envelope for `messages:send`.
fn build_request_body(job: &NotificationJob) -> Value {
    let mut message = json!({
        "token": job.token,
        "notification": {
            "title": job.title,
            "body": job.body,
        },
    });
    if !job.data.is_empty() {
        message["data"] = json!(job.data);
    }
    json!({ "message": message })
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// Map a non-2xx, non-429 response to a [`DeliveryError`].
fn classify_error(status: u16, body: &str) -> DeliveryError {
    let parsed: Option<ErrorEnvelope> = serde_json::from_str(body).ok();
    let dead_token = parsed.as_ref().is_some_and(|e| {
        e.error.details.iter().any(|d| {
            d.error_code
                .as_deref()
                .is_some_and(|c| DEAD_TOKEN_CODES.contains(&c))
        })
    });
    let message = parsed
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    if status == 404 || dead_token {
        DeliveryError::InvalidToken(message)
    } else {
        DeliveryError::Provider { status, message }
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    fn name(&self) -> &str {
        "fcm"
    }

    async fn send(&self, job: &NotificationJob) -> Result<Ack, DeliveryError> {
        debug!(recipient_id = %job.recipient_id, kind = %job.kind, "sending push via FCM");

        let access_token = self.auth.access_token().await?;
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&access_token)
            .json(&build_request_body(job))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout {
                        ms: self.timeout_ms,
                    }
                } else {
                    DeliveryError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000) // convert seconds to ms
                .unwrap_or(5000);
            return Err(DeliveryError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, recipient_id = %job.recipient_id, "FCM rejected message");
            return Err(classify_error(status, &text));
        }

        let body: SendResponse = resp
            .json()
            .await
            .map_err(|e| DeliveryError::Parse(e.to_string()))?;

        Ok(Ack {
            message_id: body.name,
        })
    }
}
