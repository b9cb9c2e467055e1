//! 调度器 + 文件存储测试

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;

use local_notify::host::{JsonFileStore, KeyValueStore};
use local_notify::notification::Scheduler;
use local_notify::{CancelOutcome, NotificationAttributes, NotifyError, RepeatType, TimerMode, TimerService};

/// 记录每个 id 最近一次设置的触发时间
#[derive(Default)]
struct RecordingTimer {
    armed: Mutex<HashMap<String, i64>>,
}

impl TimerService for RecordingTimer {
    fn arm(&self, id: &str, fire_at_ms: i64, _: &NotificationAttributes, _: TimerMode) -> anyhow::Result<()> {
        self.armed.lock().insert(id.to_string(), fire_at_ms);
        Ok(())
    }

    fn disarm(&self, id: &str) -> anyhow::Result<()> {
        self.armed.lock().remove(id);
        Ok(())
    }
}

fn at(ms: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

fn user_info(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn test_schedule_persists_across_instances() {
    let temp = tempdir().unwrap();
    let timer = Arc::new(RecordingTimer::default());
    let scheduler = Scheduler::new(Arc::new(JsonFileStore::in_dir(temp.path())), timer.clone());

    let attrs = NotificationAttributes::new("1", "Kickoff in 10", at(60_000)).with_title("Match");
    scheduler.schedule(&attrs).unwrap();
    assert_eq!(timer.armed.lock().get("1"), Some(&60_000));

    // 另一个进程打开同一数据目录能看到记录
    let reopened = Scheduler::new(
        Arc::new(JsonFileStore::in_dir(temp.path())),
        Arc::new(RecordingTimer::default()),
    );
    let stored = reopened.get("1").unwrap();
    assert_eq!(stored.message, "Kickoff in 10");
    assert_eq!(stored.title.as_deref(), Some("Match"));
}

#[test]
fn test_schedule_same_id_replaces() {
    let temp = tempdir().unwrap();
    let timer = Arc::new(RecordingTimer::default());
    let scheduler = Scheduler::new(Arc::new(JsonFileStore::in_dir(temp.path())), timer.clone());

    scheduler.schedule(&NotificationAttributes::new("1", "first", at(1_000))).unwrap();
    scheduler.schedule(&NotificationAttributes::new("1", "second", at(2_000))).unwrap();

    let records = scheduler.list().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "second");
    assert_eq!(timer.armed.lock().get("1"), Some(&2_000));
}

#[test]
fn test_invalid_record_leaves_no_trace() {
    let temp = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::in_dir(temp.path()));
    let timer = Arc::new(RecordingTimer::default());
    let scheduler = Scheduler::new(store.clone(), timer.clone());

    let result = scheduler.schedule(&NotificationAttributes::new("1", "", at(1_000)));
    assert!(matches!(result, Err(NotifyError::Validation(_))));
    assert!(store.keys().unwrap().is_empty());
    assert!(timer.armed.lock().is_empty());
}

#[test]
fn test_cancel_matching_skips_corrupt_records() {
    let temp = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::in_dir(temp.path()));
    let timer = Arc::new(RecordingTimer::default());
    let scheduler = Scheduler::new(store.clone(), timer.clone());

    scheduler
        .schedule(&NotificationAttributes::new("1", "a", at(1_000)).with_user_info("league", 12))
        .unwrap();
    scheduler
        .schedule(
            &NotificationAttributes::new("2", "b", at(2_000))
                .with_user_info("league", 12)
                .with_user_info("kind", "reminder"),
        )
        .unwrap();
    scheduler
        .schedule(&NotificationAttributes::new("3", "c", at(3_000)).with_user_info("league", 7))
        .unwrap();
    store.put("broken", "{not json").unwrap();

    let mut cancelled = scheduler
        .cancel_matching_user_info(&user_info(&[("league", json!(12))]))
        .unwrap();
    cancelled.sort();
    assert_eq!(cancelled, vec!["1", "2"]);

    let mut left = store.keys().unwrap();
    left.sort();
    assert_eq!(left, vec!["3", "broken"]);
    assert!(!timer.armed.lock().contains_key("1"));
    assert!(timer.armed.lock().contains_key("3"));
}

#[test]
fn test_cancel_all_removes_corrupt_records_too() {
    let temp = tempdir().unwrap();
    let store = Arc::new(JsonFileStore::in_dir(temp.path()));
    let scheduler = Scheduler::new(store.clone(), Arc::new(RecordingTimer::default()));

    scheduler.schedule(&NotificationAttributes::new("1", "a", at(1_000))).unwrap();
    store.put("broken", "{not json").unwrap();

    let cancelled = scheduler.cancel_all().unwrap();
    assert_eq!(cancelled.len(), 2);
    assert!(store.keys().unwrap().is_empty());
    assert_eq!(scheduler.cancel("1").unwrap(), CancelOutcome::NotFound);
}

#[test]
fn test_restore_rearms_every_readable_record() {
    let temp = tempdir().unwrap();
    let first = Scheduler::new(
        Arc::new(JsonFileStore::in_dir(temp.path())),
        Arc::new(RecordingTimer::default()),
    );
    first.schedule(&NotificationAttributes::new("1", "a", at(5_000))).unwrap();
    first
        .schedule(&NotificationAttributes::new("2", "b", at(9_000)).with_repeat(RepeatType::Hour))
        .unwrap();

    let store = Arc::new(JsonFileStore::in_dir(temp.path()));
    store.put("broken", "{not json").unwrap();

    let timer = Arc::new(RecordingTimer::default());
    let restarted = Scheduler::new(store, timer.clone());
    assert_eq!(restarted.restore().unwrap(), 2);

    let armed = timer.armed.lock();
    assert_eq!(armed.get("1"), Some(&5_000));
    assert_eq!(armed.get("2"), Some(&9_000));
    assert!(!armed.contains_key("broken"));
}

#[test]
fn test_repeat_after_fire_updates_persisted_date() {
    let temp = tempdir().unwrap();
    let timer = Arc::new(RecordingTimer::default());
    let scheduler = Scheduler::new(Arc::new(JsonFileStore::in_dir(temp.path())), timer.clone());

    let attrs = NotificationAttributes::new("4", "Check in", at(100_000))
        .with_repeat_every(std::time::Duration::from_secs(90));
    scheduler.schedule(&attrs).unwrap();

    assert_eq!(scheduler.after_fire(&attrs).unwrap(), Some(190_000));
    assert_eq!(scheduler.get("4").unwrap().fire_date, 190_000);
    assert_eq!(timer.armed.lock().get("4"), Some(&190_000));
}
