use std::fmt;

use async_trait::async_trait;

use habitpush_core::{Habit, HabitId, Recipient, RecipientId};

use crate::error::Result;

/// A stored habit that could not be read back, identified by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidHabit {
    pub habit_id: HabitId,
    pub reason: String,
}

impl fmt::Display for InvalidHabit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "habit {}: {}", self.habit_id, self.reason)
    }
}

/// One entry of a habit listing. A bad row never hides its siblings.
pub type HabitRow = std::result::Result<Habit, InvalidHabit>;

/// Repository capability the dispatcher reads recipients and habits through.
///
/// Every call reads current state; callers never cache results across passes.
#[async_trait]
pub trait HabitStore: Send + Sync {
    /// All recipients, with or without a push token.
    async fn list_recipients(&self) -> Result<Vec<Recipient>>;

    /// Look up one recipient by id. `Ok(None)` if it does not exist.
    async fn get_recipient(&self, id: &RecipientId) -> Result<Option<Recipient>>;

    /// All habits owned by `recipient_id`, each decoded on its own.
    ///
    /// The outer error is for the listing as a whole (connection, query). A
    /// row that violates an invariant comes back as an `Err` entry.
    async fn list_habits(&self, recipient_id: &RecipientId) -> Result<Vec<HabitRow>>;

    /// Record that a reminder was set up for a habit, with its `"HH:MM"` summary.
    async fn mark_scheduled(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        summary: &str,
    ) -> Result<()>;
}
