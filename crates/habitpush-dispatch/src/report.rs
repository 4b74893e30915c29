use serde::Serialize;

use habitpush_core::{HabitId, HabitPushError, NotificationJob, RecipientId, TimeOfDay};
use habitpush_delivery::DeliveryError;
use habitpush_store::{InvalidHabit, StoreError};

/// Where in a unit of work a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Reading the recipient list for a scan pass.
    ListRecipients,
    /// Reading one recipient's habits.
    ListHabits,
    /// A stored habit row could not be decoded; its siblings still run.
    InvalidRow,
    /// A habit's reminder hour/minute are half-set or out of range.
    Schedule,
    /// Looking up the owner of a changed habit.
    LookupRecipient,
    /// Writing the schedule marker back onto a new habit.
    WriteBack,
    /// The push gateway rejected or timed out a job.
    Delivery,
}

/// One recorded failure. Never aborts sibling work.
#[derive(Debug, Clone, Serialize)]
pub struct PassFailure {
    pub stage: FailureStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<RecipientId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habit_id: Option<HabitId>,
    pub code: String,
    pub error: String,
}

impl PassFailure {
    pub(crate) fn list_recipients(e: &StoreError) -> Self {
        Self {
            stage: FailureStage::ListRecipients,
            recipient_id: None,
            habit_id: None,
            code: "STORE_ERROR".to_string(),
            error: e.to_string(),
        }
    }

    pub(crate) fn list_habits(recipient_id: &RecipientId, e: &StoreError) -> Self {
        Self {
            stage: FailureStage::ListHabits,
            recipient_id: Some(recipient_id.clone()),
            habit_id: None,
            code: "STORE_ERROR".to_string(),
            error: e.to_string(),
        }
    }

    pub(crate) fn invalid_row(recipient_id: &RecipientId, invalid: &InvalidHabit) -> Self {
        Self {
            stage: FailureStage::InvalidRow,
            recipient_id: Some(recipient_id.clone()),
            habit_id: Some(invalid.habit_id.clone()),
            code: "INVALID_ROW".to_string(),
            error: invalid.reason.clone(),
        }
    }

    pub(crate) fn schedule(recipient_id: &RecipientId, habit_id: &HabitId, e: &HabitPushError) -> Self {
        Self {
            stage: FailureStage::Schedule,
            recipient_id: Some(recipient_id.clone()),
            habit_id: Some(habit_id.clone()),
            code: e.code().to_string(),
            error: e.to_string(),
        }
    }

    pub(crate) fn delivery(job: &NotificationJob, e: &DeliveryError) -> Self {
        Self {
            stage: FailureStage::Delivery,
            recipient_id: Some(job.recipient_id.clone()),
            habit_id: job.habit_id.clone(),
            code: e.code().to_string(),
            error: e.to_string(),
        }
    }
}

/// Outcome of one scan pass: counts plus every recorded failure.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// Wall-clock minute the pass evaluated.
    pub at: TimeOfDay,
    pub recipients_scanned: usize,
    /// Recipients skipped because they have no push token.
    pub recipients_without_token: usize,
    pub habits_evaluated: usize,
    /// Reminder jobs whose window matched `at`.
    pub jobs_due: usize,
    pub sent: usize,
    pub failures: Vec<PassFailure>,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn new(at: TimeOfDay) -> Self {
        Self {
            at,
            recipients_scanned: 0,
            recipients_without_token: 0,
            habits_evaluated: 0,
            jobs_due: 0,
            sent: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Deliveries that were attempted and failed.
    pub fn delivery_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.stage == FailureStage::Delivery)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
