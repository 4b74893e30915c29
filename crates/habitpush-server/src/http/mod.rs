pub mod health;
pub mod test_send;
pub mod triggers;

use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-habitpush-signature";

pub type ApiError = (StatusCode, Json<Value>);

/// Check `Authorization: Bearer <token>` against the configured token.
/// Passes when no token is configured.
pub fn verify_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), String> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if tokens_match(token, expected) {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

/// Compare tokens in constant time: both are MACed under the expected token
/// and the fixed-length tags are checked with `verify_slice`.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(expected.as_bytes());
    let tag = mac.finalize().into_bytes();

    let Ok(mut mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(provided.as_bytes());
    mac.verify_slice(&tag).is_ok()
}

/// Check `X-HabitPush-Signature: sha256=<hex>` over the raw body.
/// Passes when no secret is configured.
pub fn verify_signature(headers: &HeaderMap, body: &[u8], secret: Option<&str>) -> Result<(), String> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let sig_hex = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-HabitPush-Signature header".to_string())?
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-HabitPush-Signature header".to_string())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-HabitPush-Signature is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "signature mismatch".to_string())
}

pub fn auth_error(reason: &str) -> ApiError {
    warn!(reason = %reason, "request authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"ok": false, "error": "authentication failed", "reason": reason})),
    )
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
