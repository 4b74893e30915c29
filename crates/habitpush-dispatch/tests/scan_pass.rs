mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{dispatcher, dispatcher_with, MemoryStore, PanickyGateway, RecordingGateway, SlowGateway};
use habitpush_core::{HabitSnapshot, JobKind, TimeOfDay};
use habitpush_dispatch::FailureStage;

fn t(hour: u8, minute: u8) -> TimeOfDay {
    TimeOfDay::new(hour, minute).unwrap()
}

#[tokio::test]
async fn reminder_fires_only_in_its_minute() {
    let store = MemoryStore::new();
    let r = store.add_recipient("r", Some("tok-r"));
    store.add_habit(&r, "run", HabitSnapshot::new("Run").with_reminder(7, 0));

    let gateway = RecordingGateway::new();
    let d = dispatcher(store.clone(), gateway.clone());

    let report = d.run_scan_pass(t(6, 54)).await;
    assert_eq!(report.jobs_due, 0);
    let report = d.run_scan_pass(t(6, 56)).await;
    assert_eq!(report.jobs_due, 0);
    assert!(gateway.jobs().is_empty());

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.jobs_due, 1);
    assert_eq!(report.sent, 1);
    assert!(report.is_clean());

    let jobs = gateway.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, JobKind::Reminder);
    assert_eq!(jobs[0].token, "tok-r");
    assert!(jobs[0].body.contains("Run"));
    assert_eq!(jobs[0].habit_id.as_ref().map(|h| h.as_str()), Some("run"));
}

#[tokio::test]
async fn midnight_reminder_fires_the_evening_before() {
    let store = MemoryStore::new();
    let r = store.add_recipient("r", Some("tok"));
    store.add_habit(&r, "meditate", HabitSnapshot::new("Meditate").with_reminder(0, 2));

    let gateway = RecordingGateway::new();
    let d = dispatcher(store.clone(), gateway.clone());

    assert_eq!(d.run_scan_pass(t(0, 2)).await.jobs_due, 0);
    assert_eq!(d.run_scan_pass(t(23, 57)).await.sent, 1);
}

#[tokio::test]
async fn recipient_without_token_is_skipped_silently() {
    let store = MemoryStore::new();
    let r = store.add_recipient("no-token", None);
    store.add_habit(&r, "run", HabitSnapshot::new("Run").with_reminder(7, 0));
    let blank = store.add_recipient("blank-token", Some(""));
    store.add_habit(&blank, "read", HabitSnapshot::new("Read").with_reminder(7, 0));

    let gateway = RecordingGateway::new();
    let d = dispatcher(store.clone(), gateway.clone());

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.recipients_scanned, 2);
    assert_eq!(report.recipients_without_token, 2);
    assert_eq!(report.habits_evaluated, 0);
    assert!(report.is_clean());
    assert!(gateway.jobs().is_empty());
}

#[tokio::test]
async fn one_failed_delivery_does_not_affect_the_others() {
    let store = MemoryStore::new();
    for i in 0..5 {
        let r = store.add_recipient(&format!("r{i}"), Some(&format!("tok-{i}")));
        store.add_habit(&r, &format!("h{i}"), HabitSnapshot::new("Run").with_reminder(7, 0));
    }

    let gateway = RecordingGateway::new();
    gateway.fail_token("tok-2");
    let d = dispatcher(store.clone(), gateway.clone());

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.jobs_due, 5);
    assert_eq!(report.sent, 4);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.delivery_failures(), 1);

    let failure = &report.failures[0];
    assert_eq!(failure.stage, FailureStage::Delivery);
    assert_eq!(failure.recipient_id.as_ref().map(|r| r.as_str()), Some("r2"));
    assert_eq!(failure.code, "INVALID_TOKEN");
    assert_eq!(gateway.jobs().len(), 4);
}

#[tokio::test]
async fn habit_read_failure_is_isolated_to_its_recipient() {
    let store = MemoryStore::new();
    let good = store.add_recipient("good", Some("tok-good"));
    store.add_habit(&good, "run", HabitSnapshot::new("Run").with_reminder(7, 0));
    let bad = store.add_recipient("bad", Some("tok-bad"));
    store.add_habit(&bad, "run", HabitSnapshot::new("Run").with_reminder(7, 0));
    store.break_habit_reads(&bad);

    let gateway = RecordingGateway::new();
    let d = dispatcher(store.clone(), gateway.clone());

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::ListHabits);
    assert_eq!(gateway.jobs()[0].token, "tok-good");
}

#[tokio::test]
async fn unreadable_habit_row_does_not_drop_its_siblings() {
    let store = MemoryStore::new();
    let r = store.add_recipient("r", Some("tok-r"));
    store.add_habit(&r, "run", HabitSnapshot::new("Run").with_reminder(7, 0));
    store.add_invalid_habit(&r, "bad", "streak -3 out of range");

    let gateway = RecordingGateway::new();
    let d = dispatcher(store.clone(), gateway.clone());

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.habits_evaluated, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.stage, FailureStage::InvalidRow);
    assert_eq!(failure.code, "INVALID_ROW");
    assert_eq!(failure.habit_id.as_ref().map(|h| h.as_str()), Some("bad"));
    assert_eq!(gateway.jobs()[0].habit_id.as_ref().map(|h| h.as_str()), Some("run"));
}

#[tokio::test]
async fn recipient_listing_failure_yields_a_report_not_a_panic() {
    let store = MemoryStore::new();
    store.break_recipient_listing();
    let d = dispatcher(store.clone(), RecordingGateway::new());

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.recipients_scanned, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::ListRecipients);
}

#[tokio::test]
async fn malformed_reminders_are_recorded_and_treated_as_none() {
    let store = MemoryStore::new();
    let r = store.add_recipient("r", Some("tok"));
    let mut half = HabitSnapshot::new("Half");
    half.reminder_minute = Some(0);
    store.add_habit(&r, "half", half);
    store.add_habit(&r, "range", HabitSnapshot::new("Range").with_reminder(31, 0));
    store.add_habit(&r, "ok", HabitSnapshot::new("Run").with_reminder(7, 0));
    store.add_habit(&r, "none", HabitSnapshot::new("Untimed"));

    let gateway = RecordingGateway::new();
    let d = dispatcher(store.clone(), gateway.clone());

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.habits_evaluated, 4);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| f.stage == FailureStage::Schedule));
    let codes: Vec<&str> = report.failures.iter().map(|f| f.code.as_str()).collect();
    assert!(codes.contains(&"HALF_SET_REMINDER"));
    assert!(codes.contains(&"INVALID_SCHEDULE"));
}

#[tokio::test]
async fn fan_out_respects_max_in_flight() {
    let store = MemoryStore::new();
    for i in 0..12 {
        let r = store.add_recipient(&format!("r{i}"), Some(&format!("tok-{i}")));
        store.add_habit(&r, "run", HabitSnapshot::new("Run").with_reminder(7, 0));
    }

    let gateway = SlowGateway::new(Duration::from_millis(20));
    let d = dispatcher_with(store.clone(), gateway.clone(), 3, Duration::from_secs(5));

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.sent, 12);
    let peak = gateway.peak.load(std::sync::atomic::Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded limit");
    assert!(peak >= 2, "deliveries never overlapped (peak {peak})");
}

#[tokio::test]
async fn stalled_delivery_times_out_without_stalling_the_pass() {
    let store = MemoryStore::new();
    let r = store.add_recipient("r", Some("tok"));
    store.add_habit(&r, "run", HabitSnapshot::new("Run").with_reminder(7, 0));

    let gateway = SlowGateway::new(Duration::from_secs(30));
    let d = dispatcher_with(store.clone(), gateway, 4, Duration::from_millis(50));

    let report = tokio::time::timeout(Duration::from_secs(5), d.run_scan_pass(t(6, 55)))
        .await
        .expect("pass must finish despite the stalled gateway");
    assert_eq!(report.sent, 0);
    assert_eq!(report.failures[0].code, "TIMEOUT");
}

#[tokio::test]
async fn panicking_gateway_fails_only_that_job() {
    let store = MemoryStore::new();
    let a = store.add_recipient("a", Some("boom"));
    store.add_habit(&a, "run", HabitSnapshot::new("Run").with_reminder(7, 0));
    let b = store.add_recipient("b", Some("fine"));
    store.add_habit(&b, "run", HabitSnapshot::new("Run").with_reminder(7, 0));

    let d = dispatcher(store.clone(), Arc::new(PanickyGateway));

    let report = d.run_scan_pass(t(6, 55)).await;
    assert_eq!(report.sent, 1);
    assert_eq!(report.delivery_failures(), 1);
}
