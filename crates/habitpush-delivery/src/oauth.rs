//! OAuth2 access tokens for the FCM HTTP v1 API.
//!
//! Two sources:
//!   1. A fixed `access_token` from config, used as-is and never refreshed.
//!   2. A Google service-account JSON key. A JWT assertion is signed with
//!      RS256 (`ring`), exchanged at the account's token URI, cached, and
//!      refreshed shortly before it expires.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::signature::{self, RsaKeyPair};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use habitpush_core::config::FcmConfig;

use crate::error::DeliveryError;

/// Scope required by `messages:send`.
pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// A cached token is replaced once it is this close to expiry.
const REFRESH_MARGIN_SECS: i64 = 120;

/// Lifetime requested for each signed assertion.
const ASSERTION_TTL_SECS: i64 = 3600;

/// True while a token expiring at `expires_at` can still be handed out at `now`.
pub(crate) fn token_is_fresh(now: i64, expires_at: i64) -> bool {
    now + REFRESH_MARGIN_SECS < expires_at
}

pub(crate) struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Parsed service-account key.
pub(crate) struct ServiceAccount {
    client_email: String,
    token_uri: String,
    private_key_der: Vec<u8>,
}

/// On-disk shape of a service-account key file.
#[derive(Deserialize)]
struct ServiceAccountJson {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccount {
    fn from_file(path: &str) -> Result<Self, DeliveryError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            DeliveryError::Config(format!("cannot read service account key {path}: {e}"))
        })?;
        Self::from_json(&data)
    }

    fn from_json(data: &str) -> Result<Self, DeliveryError> {
        let raw: ServiceAccountJson = serde_json::from_str(data)
            .map_err(|e| DeliveryError::Config(format!("invalid service account JSON: {e}")))?;
        let private_key_der = pem_to_der(&raw.private_key)?;
        // Reject a bad key at startup rather than on the first send.
        RsaKeyPair::from_pkcs8(&private_key_der)
            .map_err(|e| DeliveryError::Config(format!("invalid RSA private key: {e}")))?;
        Ok(Self {
            client_email: raw.client_email,
            token_uri: raw.token_uri,
            private_key_der,
        })
    }

    /// Signed `header.claims.signature` assertion issued at `now`.
    fn signed_assertion(&self, now: i64) -> Result<String, DeliveryError> {
        let header = json!({"alg": "RS256", "typ": "JWT"});
        let claims = assertion_claims(&self.client_email, &self.token_uri, now);

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let message = format!("{header_b64}.{claims_b64}");

        let key_pair = RsaKeyPair::from_pkcs8(&self.private_key_der)
            .map_err(|e| DeliveryError::Auth(format!("invalid RSA private key: {e}")))?;
        let mut sig = vec![0u8; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                message.as_bytes(),
                &mut sig,
            )
            .map_err(|e| DeliveryError::Auth(format!("RSA signing failed: {e}")))?;

        Ok(format!("{message}.{}", URL_SAFE_NO_PAD.encode(&sig)))
    }
}

fn assertion_claims(client_email: &str, token_uri: &str, now: i64) -> Value {
    json!({
        "iss": client_email,
        "scope": FCM_SCOPE,
        "aud": token_uri,
        "iat": now,
        "exp": now + ASSERTION_TTL_SECS,
    })
}

/// Decode a PEM-encoded PKCS#8 private key to DER bytes.
fn pem_to_der(pem: &str) -> Result<Vec<u8>, DeliveryError> {
    use base64::engine::general_purpose::STANDARD;

    let b64: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect();
    STANDARD
        .decode(&b64)
        .map_err(|e| DeliveryError::Config(format!("invalid PEM base64: {e}")))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

/// Where FCM bearer tokens come from.
pub(crate) enum TokenSource {
    Static(String),
    ServiceAccount {
        account: ServiceAccount,
        client: reqwest::Client,
        cached: RwLock<Option<CachedToken>>,
    },
}

impl TokenSource {
    /// A configured `access_token` wins over `service_account_path`.
    pub(crate) fn from_config(
        config: &FcmConfig,
        client: reqwest::Client,
    ) -> Result<Self, DeliveryError> {
        if let Some(token) = config.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(Self::Static(token.to_string()));
        }
        let path = config.service_account_path.as_deref().ok_or_else(|| {
            DeliveryError::Config(
                "fcm needs service_account_path or access_token".to_string(),
            )
        })?;
        let account = ServiceAccount::from_file(path)?;
        info!(client_email = %account.client_email, "FCM service account loaded");
        Ok(Self::ServiceAccount {
            account,
            client,
            cached: RwLock::new(None),
        })
    }

    /// Current bearer token, minting a new one when the cached token is stale.
    pub(crate) async fn access_token(&self) -> Result<String, DeliveryError> {
        let (account, client, cached) = match self {
            Self::Static(token) => return Ok(token.clone()),
            Self::ServiceAccount {
                account,
                client,
                cached,
            } => (account, client, cached),
        };

        {
            let guard = cached.read().await;
            if let Some(c) = guard.as_ref() {
                if token_is_fresh(chrono::Utc::now().timestamp(), c.expires_at) {
                    return Ok(c.token.clone());
                }
            }
        }

        let mut guard = cached.write().await;
        let now = chrono::Utc::now().timestamp();
        // another sender may have refreshed while we waited for the lock
        if let Some(c) = guard.as_ref() {
            if token_is_fresh(now, c.expires_at) {
                return Ok(c.token.clone());
            }
        }

        info!("exchanging service account JWT for FCM access token");
        let fresh = exchange_assertion(client, account, now).await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }
}

async fn exchange_assertion(
    client: &reqwest::Client,
    account: &ServiceAccount,
    now: i64,
) -> Result<CachedToken, DeliveryError> {
    let jwt = account.signed_assertion(now)?;

    let resp = client
        .post(&account.token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ])
        .send()
        .await
        .map_err(|e| DeliveryError::Auth(format!("token exchange request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(DeliveryError::Auth(format!(
            "token exchange failed ({status}): {text}"
        )));
    }

    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| DeliveryError::Parse(e.to_string()))?;
    debug!(expires_in = body.expires_in, "FCM access token obtained");

    Ok(CachedToken {
        token: body.access_token,
        expires_at: now + body.expires_in,
    })
}
