//! `habitpush-core`: shared types, configuration, and the pure evaluators
//! behind habit reminders and streak milestones.
//!
//! Nothing in this crate performs I/O except [`config::HabitPushConfig::load`].

pub mod config;
pub mod error;
pub mod message;
pub mod milestone;
pub mod reminder;
pub mod types;

pub use error::{HabitPushError, Result};
pub use types::{
    Habit, HabitEvent, HabitId, HabitSnapshot, JobKind, NotificationJob, Recipient, RecipientId,
    TimeOfDay,
};
