//! 调度器 - 管理持久化调度通知的生命周期
//!
//! `schedule` 是 upsert：以 id 为键写入记录，并按触发时间（重新）设置定时器。
//! 同一 id 的写操作通过单独的锁串行化，不同 id 之间只在查锁表时短暂竞争。

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::attributes::NotificationAttributes;
use super::repeat::{self, RepeatType};
use crate::error::{NotifyError, Result};
use crate::host::{KeyValueStore, TimerMode, TimerService};

/// 取消结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// 记录已删除
    Removed,
    /// 没有该 id 的记录，定时器仍然会被取消
    NotFound,
}

/// 调度器
pub struct Scheduler {
    /// 记录存储
    store: Arc<dyn KeyValueStore>,
    /// 宿主定时器
    timer: Arc<dyn TimerService>,
    /// 定时器精度
    mode: TimerMode,
    /// 每个 id 一把锁
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Scheduler {
    /// 创建新的调度器
    pub fn new(store: Arc<dyn KeyValueStore>, timer: Arc<dyn TimerService>) -> Self {
        Self {
            store,
            timer,
            mode: TimerMode::Exact,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 设置定时器精度
    pub fn with_timer_mode(mut self, mode: TimerMode) -> Self {
        self.mode = mode;
        self
    }

    /// 当前定时器精度
    pub fn timer_mode(&self) -> TimerMode {
        self.mode
    }

    /// 持久化 `attrs` 并设置定时器，校验失败时不产生任何副作用
    pub fn schedule(&self, attrs: &NotificationAttributes) -> Result<()> {
        attrs.validate()?;
        let json = attrs.to_json()?;
        let id = attrs.id.as_str();

        self.with_key_lock(id, || {
            info!(id = %id, "Storing scheduled notification");
            self.store
                .put(id, &json)
                .map_err(|e| NotifyError::collaborator("store", e))?;

            debug!(id = %id, fire_date = attrs.fire_date, mode = ?self.mode, "Arming notification timer");
            self.timer
                .arm(id, attrs.fire_date, attrs, self.mode)
                .map_err(|e| NotifyError::collaborator("timer", e))
        })
    }

    /// 取消定时器并删除记录
    pub fn cancel(&self, id: &str) -> Result<CancelOutcome> {
        self.with_key_lock(id, || {
            info!(id = %id, "Cancelling scheduled notification");
            self.timer
                .disarm(id)
                .map_err(|e| NotifyError::collaborator("timer", e))?;

            let existed = self
                .store
                .remove(id)
                .map_err(|e| NotifyError::collaborator("store", e))?;
            if existed {
                Ok(CancelOutcome::Removed)
            } else {
                warn!(id = %id, "Unable to find scheduled notification");
                Ok(CancelOutcome::NotFound)
            }
        })
    }

    /// 取消所有满足 `predicate` 的记录，跳过损坏的记录
    pub fn cancel_matching<F>(&self, predicate: F) -> Result<Vec<String>>
    where
        F: Fn(&NotificationAttributes) -> bool,
    {
        let mut cancelled = Vec::new();
        for (id, attrs) in self.scan()? {
            if !predicate(&attrs) {
                continue;
            }
            match self.cancel(&id) {
                Ok(_) => cancelled.push(id),
                Err(e) => error!(id = %id, error = %e, "Failed to cancel matching notification"),
            }
        }
        Ok(cancelled)
    }

    /// 取消 user info 包含所有给定键值的记录
    pub fn cancel_matching_user_info(&self, user_info: &Map<String, Value>) -> Result<Vec<String>> {
        self.cancel_matching(|attrs| attrs.matches(user_info))
    }

    /// 取消所有记录，包括损坏的记录
    pub fn cancel_all(&self) -> Result<Vec<String>> {
        info!("Cancelling all scheduled notifications");
        let mut cancelled = Vec::new();
        for id in self.keys()? {
            match self.cancel(&id) {
                Ok(_) => cancelled.push(id),
                Err(e) => error!(id = %id, error = %e, "Failed to cancel notification"),
            }
        }
        Ok(cancelled)
    }

    /// 读取单条记录
    pub fn get(&self, id: &str) -> Result<NotificationAttributes> {
        let json = self
            .store
            .get(id)
            .map_err(|e| NotifyError::collaborator("store", e))?
            .ok_or_else(|| NotifyError::NotFound(id.to_string()))?;
        NotificationAttributes::from_json(id, &json)
    }

    /// 所有可读记录，按触发时间升序
    pub fn list(&self) -> Result<Vec<NotificationAttributes>> {
        let mut records: Vec<NotificationAttributes> =
            self.scan()?.into_iter().map(|(_, attrs)| attrs).collect();
        records.sort_by(|a, b| a.fire_date.cmp(&b.fire_date).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// 重新设置所有记录的定时器，例如进程重启后
    pub fn restore(&self) -> Result<usize> {
        let mut armed = 0;
        for (id, attrs) in self.scan()? {
            let result = self.with_key_lock(&id, || {
                self.timer
                    .arm(&id, attrs.fire_date, &attrs, self.mode)
                    .map_err(|e| NotifyError::collaborator("timer", e))
            });
            match result {
                Ok(()) => armed += 1,
                Err(e) => error!(id = %id, error = %e, "Failed to restore notification timer"),
            }
        }
        info!(armed, "Restored scheduled notifications");
        Ok(armed)
    }

    /// 触发后的处理：重复通知按下次时间重新调度，一次性通知删除记录
    ///
    /// 重新调度时返回下次触发时间。重复规则无效时删除记录并返回错误。
    pub fn after_fire(&self, attrs: &NotificationAttributes) -> Result<Option<i64>> {
        let rule = match attrs.repeat_type.as_deref() {
            None => RepeatType::None,
            Some(raw) => match raw.parse::<RepeatType>() {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(id = %attrs.id, repeat_type = %raw, "Invalid repeat type specified");
                    self.retire(attrs);
                    return Err(e);
                }
            },
        };

        let next = match repeat::compute_next(attrs.fire_date, rule, attrs.repeat_time) {
            Ok(next) => next,
            Err(e) => {
                warn!(id = %attrs.id, error = %e, "Not rescheduling notification");
                self.retire(attrs);
                return Err(e);
            }
        };

        match next {
            Some(next_fire) => {
                debug!(id = %attrs.id, next_fire, "Repeating notification");
                let mut next_attrs = attrs.clone();
                next_attrs.fire_date = next_fire;
                self.schedule(&next_attrs)?;
                Ok(Some(next_fire))
            }
            None => {
                self.retire(attrs);
                Ok(None)
            }
        }
    }

    /// 删除已触发通知的记录，期间被重新调度过的保留
    fn retire(&self, attrs: &NotificationAttributes) {
        let id = attrs.id.as_str();
        let result = self.with_key_lock(id, || -> Result<bool> {
            match self.get(id) {
                Ok(stored) if stored.fire_date != attrs.fire_date => Ok(false),
                Ok(_) | Err(NotifyError::Deserialization { .. }) => self
                    .store
                    .remove(id)
                    .map_err(|e| NotifyError::collaborator("store", e)),
                Err(NotifyError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            }
        });
        match result {
            Ok(true) => debug!(id = %id, "Retired fired notification"),
            Ok(false) => {}
            Err(e) => error!(id = %id, error = %e, "Failed to retire fired notification"),
        }
    }

    /// 存储中的所有 id
    fn keys(&self) -> Result<Vec<String>> {
        self.store
            .keys()
            .map_err(|e| NotifyError::collaborator("store", e))
    }

    /// 所有可解析的记录，无法读取的记录记日志后跳过
    fn scan(&self) -> Result<Vec<(String, NotificationAttributes)>> {
        let mut records = Vec::new();
        for id in self.keys()? {
            match self.get(&id) {
                Ok(attrs) => records.push((id, attrs)),
                Err(NotifyError::NotFound(_)) => {}
                Err(e) => warn!(id = %id, error = %e, "Problem dealing with scheduled notification"),
            }
        }
        Ok(records)
    }

    /// 持有 `id` 的锁执行 `f`，之后回收无人等待的锁
    fn with_key_lock<T>(&self, id: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(id.to_string()).or_default())
        };

        let out = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // 只有锁表和当前调用持有，没有其他等待者
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
        out
    }
}
