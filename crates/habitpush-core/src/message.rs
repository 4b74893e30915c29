//! Notification content for each job kind.

use std::collections::BTreeMap;

use crate::milestone::MilestoneTier;
use crate::reminder::LEAD_MINUTES;
use crate::types::{HabitId, JobKind, NotificationJob, RecipientId};

/// Value of the `type` data field for reminder pushes.
pub const DATA_TYPE_REMINDER: &str = "reminder";
/// Value of the `type` data field for streak pushes. The client app keys on it.
pub const DATA_TYPE_STREAK: &str = "streak";

fn habit_data(habit_id: &HabitId, kind: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("habitId".to_string(), habit_id.to_string()),
        ("type".to_string(), kind.to_string()),
    ])
}

/// "Get ready" push sent [`LEAD_MINUTES`] before a habit's reminder time.
pub fn reminder_job(
    recipient_id: &RecipientId,
    token: &str,
    habit_id: &HabitId,
    habit_name: &str,
) -> NotificationJob {
    NotificationJob {
        kind: JobKind::Reminder,
        recipient_id: recipient_id.clone(),
        habit_id: Some(habit_id.clone()),
        token: token.to_string(),
        title: "⏰ Get ready!".to_string(),
        body: format!("In {LEAD_MINUTES} minutes: {habit_name}"),
        data: habit_data(habit_id, DATA_TYPE_REMINDER),
    }
}

/// Celebration push for reaching `streak` consecutive days.
pub fn milestone_job(
    recipient_id: &RecipientId,
    token: &str,
    habit_id: &HabitId,
    habit_name: &str,
    streak: u32,
) -> NotificationJob {
    let emoji = MilestoneTier::for_streak(streak).emoji();
    NotificationJob {
        kind: JobKind::Milestone,
        recipient_id: recipient_id.clone(),
        habit_id: Some(habit_id.clone()),
        token: token.to_string(),
        title: format!("{emoji} {streak}-day streak!"),
        body: format!("Amazing! You've kept up \"{habit_name}\" for {streak} days in a row"),
        data: habit_data(habit_id, DATA_TYPE_STREAK),
    }
}

/// Fixed smoke-test push.
pub fn test_job(recipient_id: &RecipientId, token: &str) -> NotificationJob {
    NotificationJob {
        kind: JobKind::Test,
        recipient_id: recipient_id.clone(),
        habit_id: None,
        token: token.to_string(),
        title: "🎉 Test successful!".to_string(),
        body: "Push notifications are working correctly.".to_string(),
        data: BTreeMap::new(),
    }
}
