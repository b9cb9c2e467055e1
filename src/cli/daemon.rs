//! run 命令 - 保持定时器就绪并处理触发，直到 Ctrl-C
//!
//! 其他 `lnotify` 进程会写同一个存储，所以守护进程每隔
//! `resync_interval_secs` 从存储重新设置定时器，并在每次触发前重新读取记录。

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::NotifyError;
use crate::host::{FireEvent, TokioTimerService};
use crate::notification::{EngineBuilder, NotificationEngine};

/// 运行守护进程主循环
pub async fn run_daemon(config: &Config, dry_run: bool) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let timer = Arc::new(
        TokioTimerService::new(tx)
            .with_best_effort_window(Duration::from_secs(config.best_effort_window_secs.max(1))),
    );
    let engine = EngineBuilder::from_config(config)
        .timer(timer.clone())
        .dry_run(dry_run)
        .build()?;

    let armed = engine.restore()?;
    info!(
        armed,
        store = %config.store_path().display(),
        dry_run,
        "Daemon started"
    );

    let mut resync = tokio::time::interval(Duration::from_secs(config.resync_interval_secs.max(1)));
    // 第一次 tick 立即完成，上面的 restore() 已经覆盖
    resync.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => handle_fire(&engine, event),
            _ = resync.tick() => {
                match engine.restore() {
                    Ok(count) => debug!(count, pending = timer.pending_count(), "Resynced with store"),
                    Err(e) => warn!(error = %e, "Resync failed"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// 按当前存储的记录处理一次定时器触发
///
/// 记录已删除或触发时间已变化时跳过；记录无法解析时使用定时器携带的载荷
pub fn handle_fire(engine: &NotificationEngine, event: FireEvent) {
    let fired_at = event.payload.fire_date;
    let record = match engine.get(&event.id) {
        Ok(record) => record,
        Err(NotifyError::NotFound(_)) => {
            debug!(id = %event.id, "Fired notification no longer scheduled, skipping");
            return;
        }
        Err(e) => {
            warn!(id = %event.id, error = %e, "Stored record unreadable, firing timer payload");
            event.payload
        }
    };

    // resync 可能重新设置已处理过的触发，此时存储的时间已经前移
    if record.fire_date != fired_at {
        debug!(
            id = %event.id,
            armed = fired_at,
            stored = record.fire_date,
            "Stale fire, skipping"
        );
        return;
    }

    let report = engine.on_fire(&record);
    info!(
        id = %report.id,
        delivery = ?report.delivery,
        next_fire = ?report.next_fire,
        "Notification fired"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{KeyValueStore, MemoryStore, NotificationCenter, TimerMode, TimerService};
    use crate::notification::repeat::{RepeatType, ONE_DAY_MS};
    use crate::notification::NotificationAttributes;
    use chrono::{TimeZone, Utc};

    struct NullTimer;

    impl TimerService for NullTimer {
        fn arm(&self, _: &str, _: i64, _: &NotificationAttributes, _: TimerMode) -> anyhow::Result<()> {
            Ok(())
        }

        fn disarm(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn engine(center: Arc<NotificationCenter>) -> NotificationEngine {
        EngineBuilder::new()
            .store(Arc::new(MemoryStore::new()))
            .timer(Arc::new(NullTimer))
            .tray(center)
            .build()
            .unwrap()
    }

    fn daily() -> NotificationAttributes {
        NotificationAttributes::new("5", "Daily pick", Utc.timestamp_millis_opt(10_000).unwrap())
            .with_repeat(RepeatType::Day)
    }

    #[test]
    fn test_cancelled_elsewhere_is_skipped() {
        let center = Arc::new(NotificationCenter::new());
        let engine = engine(center.clone());
        handle_fire(
            &engine,
            FireEvent {
                id: "5".to_string(),
                payload: daily(),
            },
        );
        assert!(center.active_keys().is_empty());
    }

    #[test]
    fn test_stale_fire_is_skipped() {
        let center = Arc::new(NotificationCenter::new());
        let engine = engine(center.clone());
        engine.schedule(&daily()).unwrap();

        let event = FireEvent {
            id: "5".to_string(),
            payload: daily(),
        };
        handle_fire(&engine, event.clone());
        assert_eq!(engine.get("5").unwrap().fire_date, 10_000 + ONE_DAY_MS);
        center.user_dismiss("5");

        // 同一次触发投递两次
        handle_fire(&engine, event);
        assert!(center.active_keys().is_empty());
        assert_eq!(engine.get("5").unwrap().fire_date, 10_000 + ONE_DAY_MS);
    }

    #[test]
    fn test_unreadable_record_fires_timer_payload() {
        let center = Arc::new(NotificationCenter::new());
        let store = Arc::new(MemoryStore::new());
        let engine = EngineBuilder::new()
            .store(store.clone())
            .timer(Arc::new(NullTimer))
            .tray(center.clone())
            .build()
            .unwrap();
        store.put("5", "{not json").unwrap();

        handle_fire(
            &engine,
            FireEvent {
                id: "5".to_string(),
                payload: daily(),
            },
        );

        assert!(center.active("5").is_some());
        // 重新调度会覆盖损坏的记录
        assert_eq!(engine.get("5").unwrap().fire_date, 10_000 + ONE_DAY_MS);
    }
}
