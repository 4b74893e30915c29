//! Reminder window evaluation: decides whether a habit's pre-notification
//! falls in the current minute.
//!
//! The window is exactly one minute wide. A tick that never runs for that
//! minute means the reminder is skipped for the day; there is no catch-up.

use crate::types::TimeOfDay;

/// How long before the configured time the pre-notification fires.
pub const LEAD_MINUTES: u8 = 5;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// The instant the pre-notification for `configured` fires.
///
/// Subtracts [`LEAD_MINUTES`] on a 24-hour clock, so 00:02 maps to 23:57 of
/// the (implied) previous day.
pub fn notification_instant(configured: TimeOfDay) -> TimeOfDay {
    let total = u16::from(configured.hour) * 60 + u16::from(configured.minute);
    let shifted = (total + MINUTES_PER_DAY - u16::from(LEAD_MINUTES)) % MINUTES_PER_DAY;
    TimeOfDay {
        hour: (shifted / 60) as u8,
        minute: (shifted % 60) as u8,
    }
}

/// True iff `now` is exactly the notification instant for `configured`.
pub fn should_fire_reminder(now: TimeOfDay, configured: TimeOfDay) -> bool {
    now == notification_instant(configured)
}

/// `"HH:MM"` summary written back onto a habit when its reminder is set up.
pub fn schedule_summary(configured: TimeOfDay) -> String {
    configured.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute).unwrap()
    }

    #[test]
    fn minute_at_least_lead_subtracts_in_same_hour() {
        for hour in 0..24 {
            for minute in LEAD_MINUTES..60 {
                assert_eq!(
                    notification_instant(t(hour, minute)),
                    t(hour, minute - LEAD_MINUTES),
                    "configured {hour}:{minute}"
                );
            }
        }
    }

    #[test]
    fn minute_below_lead_borrows_an_hour() {
        assert_eq!(notification_instant(t(9, 3)), t(8, 58));
        assert_eq!(notification_instant(t(7, 0)), t(6, 55));
        assert_eq!(notification_instant(t(12, 4)), t(11, 59));
    }

    #[test]
    fn midnight_wraps_to_previous_day() {
        assert_eq!(notification_instant(t(0, 2)), t(23, 57));
        assert_eq!(notification_instant(t(0, 0)), t(23, 55));
    }

    #[test]
    fn window_is_exactly_one_minute() {
        let configured = t(9, 3);
        assert!(should_fire_reminder(t(8, 58), configured));
        assert!(!should_fire_reminder(t(8, 57), configured));
        assert!(!should_fire_reminder(t(8, 59), configured));
        assert!(!should_fire_reminder(t(9, 3), configured));
    }

    #[test]
    fn summary_is_zero_padded() {
        assert_eq!(schedule_summary(t(7, 5)), "07:05");
        assert_eq!(schedule_summary(t(21, 30)), "21:30");
    }
}
