//! `habitpush-dispatch`: turns ticks and habit changes into push deliveries.
//!
//! # Triggers
//!
//! | Trigger            | Entry point                         | Sends            |
//! |--------------------|-------------------------------------|------------------|
//! | minute tick        | [`Dispatcher::run_scan_pass`]       | reminder pushes  |
//! | habit created      | [`Dispatcher::on_habit_created`]    | nothing (writes the schedule marker) |
//! | habit updated      | [`Dispatcher::on_habit_updated`]    | milestone push   |
//! | operator test      | [`Dispatcher::send_test`]           | fixed test push  |
//!
//! Scan passes and triggers never return errors: every failure is logged and,
//! for passes, recorded in the returned [`PassReport`]. Only the test path
//! surfaces lookup errors, because a caller is waiting on it.
//!
//! [`DispatchEngine`] drives the minute tick and drains queued [`HabitEvent`]s.
//!
//! [`HabitEvent`]: habitpush_core::HabitEvent

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod report;

pub use dispatcher::{DispatchOptions, Dispatcher, SkipReason, TestSendOutcome, TriggerOutcome};
pub use engine::DispatchEngine;
pub use error::{DispatchError, Result};
pub use report::{FailureStage, PassFailure, PassReport};
