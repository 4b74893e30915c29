use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use habitpush_core::{config::ClockMode, HabitEvent, TimeOfDay};

use crate::{dispatcher::Dispatcher, report::PassReport};

/// Delay past each minute boundary before the tick fires, so the wall clock
/// has clearly entered the new minute.
const TICK_SLACK_MS: u64 = 250;

/// Time from `now` until just after the next wall-clock minute boundary.
pub(crate) fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute_ms =
        u64::from(now.second()) * 1000 + u64::from(now.timestamp_subsec_millis().min(999));
    Duration::from_millis(60_000 - into_minute_ms + TICK_SLACK_MS)
}

/// Delay before the next tick, given the minute the clock reads now and the
/// last minute a pass ran for. A minute that has not been evaluated yet (a
/// pass overran the boundary) is due immediately.
pub(crate) fn next_tick_delay(
    now: DateTime<Utc>,
    current: TimeOfDay,
    last: Option<TimeOfDay>,
) -> Duration {
    if last == Some(current) {
        until_next_minute(now)
    } else {
        Duration::ZERO
    }
}

/// Drives the dispatcher: one scan pass per wall-clock minute plus queued
/// entity-change events, until shutdown.
///
/// Runs passes and events one at a time, so no two units of work of the same
/// trigger kind ever overlap.
pub struct DispatchEngine {
    dispatcher: Arc<Dispatcher>,
    clock: ClockMode,
}

impl DispatchEngine {
    pub fn new(dispatcher: Arc<Dispatcher>, clock: ClockMode) -> Self {
        Self { dispatcher, clock }
    }

    /// Main event loop. Exits when `shutdown` broadcasts `true` or its sender drops.
    ///
    /// The tick sleep lives across loop iterations and is only re-armed after
    /// it fires, so queued events never push the minute's pass back. The next
    /// deadline is taken from the wall clock, so a late pass never replays a
    /// minute and never runs the same minute twice.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<HabitEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(clock = ?self.clock, gateway = self.dispatcher.gateway_name(), "dispatch engine started");
        let mut last_minute: Option<TimeOfDay> = None;
        let mut events_open = true;

        let tick = tokio::time::sleep(until_next_minute(Utc::now()));
        tokio::pin!(tick);

        loop {
            tokio::select! {
                () = &mut tick => {
                    let now = self.clock.now();
                    if last_minute == Some(now) {
                        debug!(at = %now, "minute already evaluated, skipping tick");
                    } else {
                        last_minute = Some(now);
                        let report = self.dispatcher.run_scan_pass(now).await;
                        log_report(&report);
                    }
                    let delay = next_tick_delay(Utc::now(), self.clock.now(), last_minute);
                    tick.as_mut().reset(Instant::now() + delay);
                }
                received = events.recv(), if events_open => {
                    match received {
                        Some(event) => {
                            let outcome = self.dispatcher.handle_event(&event).await;
                            debug!(
                                recipient_id = %event.recipient_id(),
                                habit_id = %event.habit_id(),
                                ?outcome,
                                "habit event handled"
                            );
                        }
                        None => {
                            info!("habit event queue closed; continuing with ticks only");
                            events_open = false;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("dispatch engine shutting down");
                        break;
                    }
                }
            }
        }
    }
}

fn log_report(report: &PassReport) {
    info!(
        at = %report.at,
        recipients = report.recipients_scanned,
        without_token = report.recipients_without_token,
        habits = report.habits_evaluated,
        due = report.jobs_due,
        sent = report.sent,
        failed = report.failed(),
        duration_ms = report.duration_ms,
        "scan pass complete"
    );
    for failure in &report.failures {
        warn!(
            stage = ?failure.stage,
            recipient_id = ?failure.recipient_id,
            habit_id = ?failure.habit_id,
            code = %failure.code,
            error = %failure.error,
            "scan pass failure"
        );
    }
}
