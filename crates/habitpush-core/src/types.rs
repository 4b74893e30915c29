use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HabitPushError, Result};

/// Identifier of a notification recipient (the app user owning habits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub String);

impl RecipientId {
    pub fn new() -> Self {
        // UUIDv7 includes timestamp, sortable and traceable in logs
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecipientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecipientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecipientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a habit, unique within its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(pub String);

impl HabitId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HabitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HabitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Wall-clock time of day at minute granularity. No date, no time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    /// Build a validated time: hour in 0..=23, minute in 0..=59.
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(HabitPushError::InvalidTime(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    /// Hour/minute of `dt` in its own time zone.
    pub fn of<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        // Timelike guarantees hour < 24 and minute < 60.
        Self {
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = HabitPushError;

    /// Parse `"H:MM"` or `"HH:MM"`.
    fn from_str(s: &str) -> Result<Self> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| HabitPushError::InvalidTime(s.to_string()))?;
        let hour = h
            .trim()
            .parse::<u8>()
            .map_err(|_| HabitPushError::InvalidTime(s.to_string()))?;
        let minute = m
            .trim()
            .parse::<u8>()
            .map_err(|_| HabitPushError::InvalidTime(s.to_string()))?;
        Self::new(hour, minute)
    }
}

/// A notification recipient as read from the habit store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Opaque push destination token. Absent until the device registers.
    #[serde(default)]
    pub push_token: Option<String>,
}

impl Recipient {
    /// Usable delivery token, if any. Empty strings count as absent.
    pub fn token(&self) -> Option<&str> {
        self.push_token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Mutable state of a habit as the store holds it.
///
/// Reminder hour/minute are kept raw: the store does not enforce the
/// both-or-neither rule, so [`HabitSnapshot::reminder_time`] does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitSnapshot {
    pub name: String,
    #[serde(default)]
    pub reminder_hour: Option<i64>,
    #[serde(default)]
    pub reminder_minute: Option<i64>,
    #[serde(default)]
    pub streak: u32,
}

impl HabitSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reminder_hour: None,
            reminder_minute: None,
            streak: 0,
        }
    }

    pub fn with_reminder(mut self, hour: i64, minute: i64) -> Self {
        self.reminder_hour = Some(hour);
        self.reminder_minute = Some(minute);
        self
    }

    pub fn with_streak(mut self, streak: u32) -> Self {
        self.streak = streak;
        self
    }

    /// Configured daily reminder time.
    ///
    /// `Ok(None)` when both fields are unset. A half-set pair or an
    /// out-of-range value is an error; callers treat it as "no reminder".
    pub fn reminder_time(&self) -> Result<Option<TimeOfDay>> {
        match (self.reminder_hour, self.reminder_minute) {
            (None, None) => Ok(None),
            (Some(h), Some(m)) => {
                let hour = u8::try_from(h)
                    .ok()
                    .filter(|h| *h <= 23)
                    .ok_or_else(|| HabitPushError::InvalidSchedule(format!("hour {h} out of range")))?;
                let minute = u8::try_from(m)
                    .ok()
                    .filter(|m| *m <= 59)
                    .ok_or_else(|| {
                        HabitPushError::InvalidSchedule(format!("minute {m} out of range"))
                    })?;
                Ok(Some(TimeOfDay { hour, minute }))
            }
            (hour, minute) => Err(HabitPushError::HalfSetReminder { hour, minute }),
        }
    }
}

/// A habit with its identity and owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub recipient_id: RecipientId,
    #[serde(flatten)]
    pub snapshot: HabitSnapshot,
}

/// Entity-change notification delivered by the habit store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HabitEvent {
    Created {
        recipient_id: RecipientId,
        habit_id: HabitId,
        habit: HabitSnapshot,
    },
    Updated {
        recipient_id: RecipientId,
        habit_id: HabitId,
        before: HabitSnapshot,
        after: HabitSnapshot,
    },
}

impl HabitEvent {
    pub fn created(habit: &Habit) -> Self {
        HabitEvent::Created {
            recipient_id: habit.recipient_id.clone(),
            habit_id: habit.id.clone(),
            habit: habit.snapshot.clone(),
        }
    }

    /// Both habits must share the same id and owner; `after`'s are used.
    pub fn updated(before: &Habit, after: &Habit) -> Self {
        HabitEvent::Updated {
            recipient_id: after.recipient_id.clone(),
            habit_id: after.id.clone(),
            before: before.snapshot.clone(),
            after: after.snapshot.clone(),
        }
    }

    pub fn recipient_id(&self) -> &RecipientId {
        match self {
            HabitEvent::Created { recipient_id, .. } | HabitEvent::Updated { recipient_id, .. } => {
                recipient_id
            }
        }
    }

    pub fn habit_id(&self) -> &HabitId {
        match self {
            HabitEvent::Created { habit_id, .. } | HabitEvent::Updated { habit_id, .. } => habit_id,
        }
    }
}

/// Why a notification is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Reminder,
    Milestone,
    Test,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Reminder => "reminder",
            JobKind::Milestone => "milestone",
            JobKind::Test => "test",
        };
        write!(f, "{s}")
    }
}

/// One push message ready for the delivery gateway. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub kind: JobKind,
    /// Owner of `token`; carried for logging and pass reports.
    pub recipient_id: RecipientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habit_id: Option<HabitId>,
    pub token: String,
    pub title: String,
    pub body: String,
    /// String-to-string payload forwarded to the client app.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_of_day_rejects_out_of_range() {
        assert!(TimeOfDay::new(24, 0).is_err());
        assert!(TimeOfDay::new(0, 60).is_err());
        assert!(TimeOfDay::new(23, 59).is_ok());
    }

    #[test]
    fn time_of_day_parses_and_pads() {
        let t: TimeOfDay = "7:05".parse().unwrap();
        assert_eq!(t, TimeOfDay { hour: 7, minute: 5 });
        assert_eq!(t.to_string(), "07:05");
        assert!("7".parse::<TimeOfDay>().is_err());
        assert!("25:00".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn reminder_time_both_unset_is_none() {
        let habit = HabitSnapshot::new("Run");
        assert_eq!(habit.reminder_time().unwrap(), None);
    }

    #[test]
    fn reminder_time_half_set_is_error() {
        let mut habit = HabitSnapshot::new("Run");
        habit.reminder_hour = Some(7);
        let err = habit.reminder_time().unwrap_err();
        assert_eq!(err.code(), "HALF_SET_REMINDER");
    }

    #[test]
    fn reminder_time_out_of_range_is_error() {
        let habit = HabitSnapshot::new("Run").with_reminder(7, 75);
        assert_eq!(habit.reminder_time().unwrap_err().code(), "INVALID_SCHEDULE");
        let habit = HabitSnapshot::new("Run").with_reminder(-1, 0);
        assert_eq!(habit.reminder_time().unwrap_err().code(), "INVALID_SCHEDULE");
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let mut r = Recipient {
            id: "u1".into(),
            display_name: None,
            push_token: Some("  ".to_string()),
        };
        assert_eq!(r.token(), None);
        r.push_token = Some("tok".to_string());
        assert_eq!(r.token(), Some("tok"));
    }

    #[test]
    fn habit_event_wire_format() {
        let json = r#"{"event":"updated","recipient_id":"u1","habit_id":"h1",
            "before":{"name":"Read","streak":6},
            "after":{"name":"Read","streak":7}}"#;
        let ev: HabitEvent = serde_json::from_str(json).unwrap();
        match ev {
            HabitEvent::Updated { before, after, .. } => {
                assert_eq!(before.streak, 6);
                assert_eq!(after.streak, 7);
                assert_eq!(after.reminder_hour, None);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}
