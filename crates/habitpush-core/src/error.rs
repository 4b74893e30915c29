use thiserror::Error;

#[derive(Debug, Error)]
pub enum HabitPushError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Only one of reminder hour/minute is set on a habit.
    #[error("Reminder is half-set: hour={hour:?}, minute={minute:?}")]
    HalfSetReminder {
        hour: Option<i64>,
        minute: Option<i64>,
    },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid time of day: {0}")]
    InvalidTime(String),
}

impl HabitPushError {
    /// Short error code recorded in pass reports and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            HabitPushError::Config(_) => "CONFIG_ERROR",
            HabitPushError::HalfSetReminder { .. } => "HALF_SET_REMINDER",
            HabitPushError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            HabitPushError::InvalidTime(_) => "INVALID_TIME",
        }
    }
}

pub type Result<T> = std::result::Result<T, HabitPushError>;
