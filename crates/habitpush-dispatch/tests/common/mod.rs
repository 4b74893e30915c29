//! Test doubles shared by the dispatch integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use habitpush_core::{Habit, HabitId, HabitSnapshot, NotificationJob, Recipient, RecipientId};
use habitpush_delivery::{Ack, DeliveryError, PushGateway};
use habitpush_dispatch::{DispatchOptions, Dispatcher};
use habitpush_store::{HabitRow, HabitStore, InvalidHabit, StoreError};

/// In-memory store with per-recipient read failure injection.
#[derive(Default)]
pub struct MemoryStore {
    recipients: Mutex<BTreeMap<RecipientId, Recipient>>,
    habits: Mutex<Vec<Habit>>,
    invalid: Mutex<Vec<(RecipientId, InvalidHabit)>>,
    broken_reads: Mutex<HashSet<RecipientId>>,
    fail_listing: Mutex<bool>,
    pub marks: Mutex<Vec<(RecipientId, HabitId, String)>>,
    /// Number of recipient listings, one per scan pass.
    pub passes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_recipient(&self, id: &str, token: Option<&str>) -> RecipientId {
        let rid = RecipientId::from(id);
        self.recipients.lock().unwrap().insert(
            rid.clone(),
            Recipient {
                id: rid.clone(),
                display_name: None,
                push_token: token.map(String::from),
            },
        );
        rid
    }

    pub fn add_habit(&self, recipient: &RecipientId, id: &str, snapshot: HabitSnapshot) -> HabitId {
        let hid = HabitId::from(id);
        self.habits.lock().unwrap().push(Habit {
            id: hid.clone(),
            recipient_id: recipient.clone(),
            snapshot,
        });
        hid
    }

    /// A stored habit that fails to decode, listed after the readable ones.
    pub fn add_invalid_habit(&self, recipient: &RecipientId, id: &str, reason: &str) {
        self.invalid.lock().unwrap().push((
            recipient.clone(),
            InvalidHabit {
                habit_id: HabitId::from(id),
                reason: reason.to_string(),
            },
        ));
    }

    pub fn break_habit_reads(&self, recipient: &RecipientId) {
        self.broken_reads.lock().unwrap().insert(recipient.clone());
    }

    pub fn break_recipient_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }
}

#[async_trait]
impl HabitStore for MemoryStore {
    async fn list_recipients(&self) -> habitpush_store::Result<Vec<Recipient>> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_listing.lock().unwrap() {
            return Err(StoreError::Backend("listing unavailable".to_string()));
        }
        Ok(self.recipients.lock().unwrap().values().cloned().collect())
    }

    async fn get_recipient(&self, id: &RecipientId) -> habitpush_store::Result<Option<Recipient>> {
        if *self.fail_listing.lock().unwrap() {
            return Err(StoreError::Backend("lookup unavailable".to_string()));
        }
        Ok(self.recipients.lock().unwrap().get(id).cloned())
    }

    async fn list_habits(&self, recipient_id: &RecipientId) -> habitpush_store::Result<Vec<HabitRow>> {
        if self.broken_reads.lock().unwrap().contains(recipient_id) {
            return Err(StoreError::Backend(format!("transient read error for {recipient_id}")));
        }
        let mut rows: Vec<HabitRow> = self
            .habits
            .lock()
            .unwrap()
            .iter()
            .filter(|h| &h.recipient_id == recipient_id)
            .cloned()
            .map(Ok)
            .collect();
        rows.extend(
            self.invalid
                .lock()
                .unwrap()
                .iter()
                .filter(|(owner, _)| owner == recipient_id)
                .map(|(_, invalid)| Err(invalid.clone())),
        );
        Ok(rows)
    }

    async fn mark_scheduled(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        summary: &str,
    ) -> habitpush_store::Result<()> {
        self.marks
            .lock()
            .unwrap()
            .push((recipient_id.clone(), habit_id.clone(), summary.to_string()));
        Ok(())
    }
}

/// Records every job; fails jobs addressed to configured tokens.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<NotificationJob>>,
    failing_tokens: Mutex<HashSet<String>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_token(&self, token: &str) {
        self.failing_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn jobs(&self) -> Vec<NotificationJob> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, job: &NotificationJob) -> Result<Ack, DeliveryError> {
        if self.failing_tokens.lock().unwrap().contains(&job.token) {
            return Err(DeliveryError::InvalidToken(job.token.clone()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(job.clone());
        Ok(Ack {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

/// Sleeps on every send while tracking peak concurrency.
pub struct SlowGateway {
    delay: Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub completed: AtomicUsize,
}

impl SlowGateway {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PushGateway for SlowGateway {
    fn name(&self) -> &str {
        "slow"
    }

    async fn send(&self, _job: &NotificationJob) -> Result<Ack, DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Ack {
            message_id: "slow".to_string(),
        })
    }
}

/// Panics when sending to the token "boom".
pub struct PanickyGateway;

#[async_trait]
impl PushGateway for PanickyGateway {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn send(&self, job: &NotificationJob) -> Result<Ack, DeliveryError> {
        if job.token == "boom" {
            panic!("gateway bug");
        }
        Ok(Ack {
            message_id: "ok".to_string(),
        })
    }
}

pub fn dispatcher(store: Arc<dyn HabitStore>, gateway: Arc<dyn PushGateway>) -> Dispatcher {
    Dispatcher::new(store, gateway, DispatchOptions::default())
}

pub fn dispatcher_with(
    store: Arc<dyn HabitStore>,
    gateway: Arc<dyn PushGateway>,
    max_in_flight: usize,
    delivery_timeout: Duration,
) -> Dispatcher {
    Dispatcher::new(
        store,
        gateway,
        DispatchOptions {
            max_in_flight,
            delivery_timeout,
        },
    )
}
