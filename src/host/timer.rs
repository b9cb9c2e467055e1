//! 基于 tokio 的进程内定时器
//!
//! 每个已设置的 id 对应一个休眠任务，唤醒后在构造时传入的 channel 上发送
//! [`FireEvent`]，接收方调用 `NotificationEngine::on_fire`。
//!
//! 每次设置分配一个代号。任务唤醒后只有代号仍是该 id 当前代号时才会触发
//! 并清理表项，所以与唤醒竞争的重新设置或取消总是生效。

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{TimerMode, TimerService};
use crate::notification::attributes::NotificationAttributes;

/// 定时器触发事件
#[derive(Debug, Clone)]
pub struct FireEvent {
    /// 通知 id
    pub id: String,
    /// 设置定时器时的通知载荷
    pub payload: NotificationAttributes,
}

/// 休眠中的唤醒任务及其代号
struct PendingWake {
    /// 设置时分配的代号
    generation: u64,
    /// 休眠任务
    task: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingWake>>>;

/// tokio 定时器服务
pub struct TokioTimerService {
    /// 用于 spawn 的运行时
    handle: Handle,
    /// 触发事件发送端
    events: mpsc::UnboundedSender<FireEvent>,
    /// id -> 休眠任务
    pending: PendingMap,
    /// 下一个代号
    next_generation: AtomicU64,
    /// best-effort 唤醒的对齐窗口
    best_effort_window: Duration,
}

impl TokioTimerService {
    /// 创建定时器服务，必须在 tokio 运行时内调用
    pub fn new(events: mpsc::UnboundedSender<FireEvent>) -> Self {
        Self::with_handle(Handle::current(), events)
    }

    /// 使用指定运行时创建
    pub fn with_handle(handle: Handle, events: mpsc::UnboundedSender<FireEvent>) -> Self {
        Self {
            handle,
            events,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            best_effort_window: Duration::from_secs(60),
        }
    }

    /// best-effort 唤醒推迟到该窗口的下一个整数倍
    pub fn with_best_effort_window(mut self, window: Duration) -> Self {
        self.best_effort_window = window;
        self
    }

    /// 等待中的定时器数量
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// `id` 是否有等待中的定时器
    pub fn is_armed(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// 距离触发的时长，已过期为 0
    fn delay_for(&self, fire_at_ms: i64, mode: TimerMode) -> Duration {
        let remaining = fire_at_ms.saturating_sub(Utc::now().timestamp_millis());
        let delay = Duration::from_millis(remaining.max(0) as u64);
        match mode {
            TimerMode::Exact => delay,
            TimerMode::BestEffort => round_up(delay, self.best_effort_window),
        }
    }
}

/// 不小于 `delay` 的 `window` 最小整数倍
fn round_up(delay: Duration, window: Duration) -> Duration {
    let window_ms = window.as_millis();
    if window_ms == 0 {
        return delay;
    }
    let slots = delay.as_millis().div_ceil(window_ms);
    Duration::from_millis((slots * window_ms) as u64)
}

impl TimerService for TokioTimerService {
    fn arm(&self, id: &str, fire_at_ms: i64, payload: &NotificationAttributes, mode: TimerMode) -> Result<()> {
        let delay = self.delay_for(fire_at_ms, mode);
        let event = FireEvent {
            id: id.to_string(),
            payload: payload.clone(),
        };
        let events = self.events.clone();
        let pending = Arc::clone(&self.pending);
        let key = id.to_string();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // spawn 期间持有表锁，任务在登记之前无法检查代号
        let mut guard = self.pending.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = pending.lock();
                if map.get(&key).map(|wake| wake.generation) != Some(generation) {
                    debug!(id = %key, generation, "Wake superseded, not firing");
                    return;
                }
                map.remove(&key);
            }
            if events.send(event).is_err() {
                warn!(id = %key, "Fire event dropped, receiver closed");
            }
        });
        if let Some(previous) = guard.insert(id.to_string(), PendingWake { generation, task }) {
            previous.task.abort();
        }

        debug!(id = %id, delay_ms = delay.as_millis() as u64, ?mode, "Timer armed");
        Ok(())
    }

    fn disarm(&self, id: &str) -> Result<()> {
        if let Some(wake) = self.pending.lock().remove(id) {
            wake.task.abort();
            debug!(id = %id, "Timer disarmed");
        }
        Ok(())
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for (_, wake) in self.pending.lock().drain() {
            wake.task.abort();
        }
    }
}
