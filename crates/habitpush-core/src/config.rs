use chrono::{Local, Utc};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::TimeOfDay;

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_EVENT_QUEUE: usize = 256;
pub const DEFAULT_FCM_BASE_URL: &str = "https://fcm.googleapis.com";

/// Top-level config (habitpush.toml + HABITPUSH_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HabitPushConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on `/triggers/*` and `/test-send`. Open when unset.
    #[serde(default)]
    pub trigger_token: Option<String>,
    /// HMAC-SHA256 key for `X-HabitPush-Signature` on `/triggers/*`.
    /// Checked in addition to the bearer token when set.
    #[serde(default)]
    pub trigger_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            trigger_token: None,
            trigger_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Which wall clock reminder times are compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    #[default]
    Utc,
    /// The host's local time zone.
    Local,
}

impl ClockMode {
    pub fn now(self) -> TimeOfDay {
        match self {
            ClockMode::Utc => TimeOfDay::of(&Utc::now()),
            ClockMode::Local => TimeOfDay::of(&Local::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub clock: ClockMode,
    /// Upper bound on concurrent delivery calls within one pass.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Per-call delivery deadline.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Capacity of the entity-change event queue feeding the engine.
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            event_queue: DEFAULT_EVENT_QUEUE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryProvider {
    /// Firebase Cloud Messaging HTTP v1.
    Fcm,
    /// Log every job and acknowledge it without sending anything.
    #[default]
    Log,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub provider: DeliveryProvider,
    #[serde(default)]
    pub fcm: Option<FcmConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub project_id: String,
    /// Google service-account JSON key. Access tokens are minted from it and
    /// refreshed before they expire.
    #[serde(default)]
    pub service_account_path: Option<String>,
    /// Fixed OAuth2 access token with the `firebase.messaging` scope. Takes
    /// precedence over `service_account_path`; it is never refreshed.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_fcm_base_url")]
    pub base_url: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}
fn default_delivery_timeout_ms() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_MS
}
fn default_event_queue() -> usize {
    DEFAULT_EVENT_QUEUE
}
fn default_fcm_base_url() -> String {
    DEFAULT_FCM_BASE_URL.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.habitpush/habitpush.db", home)
}

impl HabitPushConfig {
    /// Load config from a TOML file with HABITPUSH_* env var overrides.
    ///
    /// Uses the explicit path when given, otherwise `~/.habitpush/habitpush.toml`.
    /// A missing file is fine; every section has defaults. Env keys nest on a
    /// double underscore, e.g. `HABITPUSH_DISPATCH__MAX_IN_FLIGHT=4`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("HABITPUSH_").split("__")),
        )
    }

    /// Parse config from an in-memory TOML document (no env overrides).
    pub fn from_toml_str(toml: &str) -> crate::error::Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        let config: HabitPushConfig = figment
            .extract()
            .map_err(|e| crate::error::HabitPushError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        use crate::error::HabitPushError;

        if self.dispatch.max_in_flight == 0 {
            return Err(HabitPushError::Config(
                "dispatch.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.dispatch.event_queue == 0 {
            return Err(HabitPushError::Config(
                "dispatch.event_queue must be at least 1".to_string(),
            ));
        }
        if self.delivery.provider == DeliveryProvider::Fcm {
            let Some(fcm) = &self.delivery.fcm else {
                return Err(HabitPushError::Config(
                    "delivery.provider = \"fcm\" requires a [delivery.fcm] section".to_string(),
                ));
            };
            if fcm.access_token.is_none() && fcm.service_account_path.is_none() {
                return Err(HabitPushError::Config(
                    "delivery.fcm needs service_account_path or access_token".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.habitpush/habitpush.toml", home)
}
