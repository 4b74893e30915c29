use thiserror::Error;

/// Failure of a single delivery call. Always recoverable from the caller's view.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request.
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// The destination token is unknown or no longer registered.
    #[error("Invalid or unregistered token: {0}")]
    InvalidToken(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Delivery timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// An FCM access token could not be obtained.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeliveryError {
    /// Short error code recorded in pass reports.
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::Http(_) => "HTTP_ERROR",
            DeliveryError::Provider { .. } => "PROVIDER_ERROR",
            DeliveryError::InvalidToken(_) => "INVALID_TOKEN",
            DeliveryError::RateLimited { .. } => "RATE_LIMITED",
            DeliveryError::Timeout { .. } => "TIMEOUT",
            DeliveryError::Auth(_) => "AUTH_ERROR",
            DeliveryError::Parse(_) => "PARSE_ERROR",
            DeliveryError::Config(_) => "CONFIG_ERROR",
        }
    }
}
