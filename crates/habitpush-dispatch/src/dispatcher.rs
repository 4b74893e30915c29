use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{stream, FutureExt, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use habitpush_core::{
    config::DispatchConfig,
    message::{milestone_job, reminder_job, test_job},
    milestone::crossed_milestone,
    reminder::{schedule_summary, should_fire_reminder},
    HabitEvent, HabitId, HabitSnapshot, JobKind, NotificationJob, RecipientId, TimeOfDay,
};
use habitpush_delivery::{Ack, DeliveryError, PushGateway};
use habitpush_store::HabitStore;

use crate::{
    error::Result,
    report::{FailureStage, PassFailure, PassReport},
};

/// Tuning knobs for delivery fan-out.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum concurrent gateway calls within one pass.
    pub max_in_flight: usize,
    /// Deadline applied to every gateway call.
    pub delivery_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchOptions {
    fn from(cfg: &DispatchConfig) -> Self {
        Self {
            max_in_flight: cfg.max_in_flight.max(1),
            delivery_timeout: Duration::from_millis(cfg.delivery_timeout_ms),
        }
    }
}

/// Why an entity trigger ended without sending anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Habit has no reminder time.
    NoReminder,
    /// Reminder hour/minute are half-set or out of range.
    InvalidSchedule,
    NoStreakChange,
    /// Streak changed but did not land on a milestone.
    NotAMilestone,
    RecipientMissing,
    NoToken,
}

/// Result of handling one entity-change trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Skipped { reason: SkipReason },
    /// Schedule marker written back onto a new habit.
    Scheduled { summary: String },
    Delivered { kind: JobKind, message_id: String },
    Failed { stage: FailureStage, error: String },
}

/// Result of an operator test send. Every variant is a distinct answer for the caller.
#[derive(Debug)]
pub enum TestSendOutcome {
    RecipientMissing,
    NoToken,
    Delivered(Ack),
    DeliveryFailed(DeliveryError),
}

/// Stateless orchestrator over an injected store and push gateway.
///
/// Holds no per-pass state; every call reads current data from the store.
pub struct Dispatcher {
    store: Arc<dyn HabitStore>,
    gateway: Arc<dyn PushGateway>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn HabitStore>,
        gateway: Arc<dyn PushGateway>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            store,
            gateway,
            options,
        }
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Evaluate every (recipient, habit) pair against `now` and send due reminders.
    ///
    /// Reads all recipients and their habits first, then delivers due jobs on a
    /// worker pool bounded by `max_in_flight`. Never fails: read, schedule and
    /// delivery errors are recorded in the report and the pass carries on.
    pub async fn run_scan_pass(&self, now: TimeOfDay) -> PassReport {
        let started = Instant::now();
        let mut report = PassReport::new(now);

        let recipients = match self.store.list_recipients().await {
            Ok(r) => r,
            Err(e) => {
                error!(at = %now, error = %e, "scan pass: listing recipients failed");
                report.failures.push(PassFailure::list_recipients(&e));
                report.duration_ms = started.elapsed().as_millis() as u64;
                return report;
            }
        };

        let mut due: Vec<NotificationJob> = Vec::new();
        for recipient in &recipients {
            report.recipients_scanned += 1;
            let Some(token) = recipient.token() else {
                report.recipients_without_token += 1;
                continue;
            };

            let habits = match self.store.list_habits(&recipient.id).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(recipient_id = %recipient.id, error = %e, "scan pass: listing habits failed");
                    report
                        .failures
                        .push(PassFailure::list_habits(&recipient.id, &e));
                    continue;
                }
            };

            for row in &habits {
                report.habits_evaluated += 1;
                let habit = match row {
                    Ok(habit) => habit,
                    Err(invalid) => {
                        warn!(recipient_id = %recipient.id, %invalid, "scan pass: skipping unreadable habit");
                        report
                            .failures
                            .push(PassFailure::invalid_row(&recipient.id, invalid));
                        continue;
                    }
                };
                match habit.snapshot.reminder_time() {
                    Ok(Some(at)) if should_fire_reminder(now, at) => {
                        debug!(recipient_id = %recipient.id, habit_id = %habit.id, reminder = %at, "reminder due");
                        due.push(reminder_job(
                            &recipient.id,
                            token,
                            &habit.id,
                            &habit.snapshot.name,
                        ));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            recipient_id = %recipient.id,
                            habit_id = %habit.id,
                            error = %e,
                            "scan pass: habit has an unusable reminder, treating as none"
                        );
                        report
                            .failures
                            .push(PassFailure::schedule(&recipient.id, &habit.id, &e));
                    }
                }
            }
        }

        report.jobs_due = due.len();

        let outcomes: Vec<(NotificationJob, std::result::Result<Ack, DeliveryError>)> =
            stream::iter(due)
                .map(|job| async move {
                    let result = self.deliver(&job).await;
                    (job, result)
                })
                .buffer_unordered(self.options.max_in_flight)
                .collect()
                .await;

        for (job, result) in outcomes {
            match result {
                Ok(ack) => {
                    report.sent += 1;
                    info!(
                        recipient_id = %job.recipient_id,
                        habit_id = ?job.habit_id,
                        message_id = %ack.message_id,
                        "reminder sent"
                    );
                }
                Err(e) => {
                    warn!(
                        recipient_id = %job.recipient_id,
                        habit_id = ?job.habit_id,
                        code = e.code(),
                        error = %e,
                        "reminder delivery failed"
                    );
                    report.failures.push(PassFailure::delivery(&job, &e));
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    /// Route a queued entity-change event to its trigger.
    pub async fn handle_event(&self, event: &HabitEvent) -> TriggerOutcome {
        match event {
            HabitEvent::Created {
                recipient_id,
                habit_id,
                habit,
            } => self.on_habit_created(recipient_id, habit_id, habit).await,
            HabitEvent::Updated {
                recipient_id,
                habit_id,
                before,
                after,
            } => {
                self.on_habit_updated(recipient_id, habit_id, before, after)
                    .await
            }
        }
    }

    /// Write the schedule marker onto a newly created habit that has a reminder.
    pub async fn on_habit_created(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        habit: &HabitSnapshot,
    ) -> TriggerOutcome {
        let at = match habit.reminder_time() {
            Ok(Some(at)) => at,
            Ok(None) => {
                return TriggerOutcome::Skipped {
                    reason: SkipReason::NoReminder,
                }
            }
            Err(e) => {
                warn!(%recipient_id, %habit_id, error = %e, "new habit has an unusable reminder");
                return TriggerOutcome::Skipped {
                    reason: SkipReason::InvalidSchedule,
                };
            }
        };

        let summary = schedule_summary(at);
        info!(%recipient_id, %habit_id, name = %habit.name, reminder = %summary, "new habit with reminder");

        match self
            .store
            .mark_scheduled(recipient_id, habit_id, &summary)
            .await
        {
            Ok(()) => TriggerOutcome::Scheduled { summary },
            Err(e) => {
                warn!(%recipient_id, %habit_id, error = %e, "writing schedule marker failed");
                TriggerOutcome::Failed {
                    stage: FailureStage::WriteBack,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Send a milestone push if the streak just landed on a milestone.
    pub async fn on_habit_updated(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        before: &HabitSnapshot,
        after: &HabitSnapshot,
    ) -> TriggerOutcome {
        let Some(streak) = crossed_milestone(before.streak, after.streak) else {
            let reason = if before.streak == after.streak {
                SkipReason::NoStreakChange
            } else {
                SkipReason::NotAMilestone
            };
            return TriggerOutcome::Skipped { reason };
        };

        let recipient = match self.store.get_recipient(recipient_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                debug!(%recipient_id, %habit_id, "milestone for unknown recipient dropped");
                return TriggerOutcome::Skipped {
                    reason: SkipReason::RecipientMissing,
                };
            }
            Err(e) => {
                warn!(%recipient_id, %habit_id, error = %e, "milestone: recipient lookup failed");
                return TriggerOutcome::Failed {
                    stage: FailureStage::LookupRecipient,
                    error: e.to_string(),
                };
            }
        };

        let Some(token) = recipient.token() else {
            debug!(%recipient_id, %habit_id, streak, "milestone for recipient without token dropped");
            return TriggerOutcome::Skipped {
                reason: SkipReason::NoToken,
            };
        };

        let job = milestone_job(recipient_id, token, habit_id, &after.name, streak);
        match self.deliver(&job).await {
            Ok(ack) => {
                info!(%recipient_id, %habit_id, streak, message_id = %ack.message_id, "milestone sent");
                TriggerOutcome::Delivered {
                    kind: JobKind::Milestone,
                    message_id: ack.message_id,
                }
            }
            Err(e) => {
                warn!(%recipient_id, %habit_id, streak, code = e.code(), error = %e, "milestone delivery failed");
                TriggerOutcome::Failed {
                    stage: FailureStage::Delivery,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Send the fixed test push to one recipient.
    ///
    /// Returns `Err` only when the store lookup itself fails.
    pub async fn send_test(&self, recipient_id: &RecipientId) -> Result<TestSendOutcome> {
        let Some(recipient) = self.store.get_recipient(recipient_id).await? else {
            return Ok(TestSendOutcome::RecipientMissing);
        };
        let Some(token) = recipient.token() else {
            return Ok(TestSendOutcome::NoToken);
        };

        let job = test_job(recipient_id, token);
        Ok(match self.deliver(&job).await {
            Ok(ack) => {
                info!(%recipient_id, message_id = %ack.message_id, "test push sent");
                TestSendOutcome::Delivered(ack)
            }
            Err(e) => {
                warn!(%recipient_id, error = %e, "test push failed");
                TestSendOutcome::DeliveryFailed(e)
            }
        })
    }

    /// One gateway call under the configured deadline.
    ///
    /// A panicking gateway is reported as a provider error for this job only.
    async fn deliver(&self, job: &NotificationJob) -> std::result::Result<Ack, DeliveryError> {
        let timeout = self.options.delivery_timeout;
        let send = AssertUnwindSafe(self.gateway.send(job)).catch_unwind();
        match tokio::time::timeout(timeout, send).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(DeliveryError::Provider {
                status: 0,
                message: format!("{} gateway panicked", self.gateway.name()),
            }),
            Err(_) => Err(DeliveryError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        }
    }
}
