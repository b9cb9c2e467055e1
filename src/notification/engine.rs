//! 通知引擎 - 组装协作者并对外提供调度、取消、触发等操作

use anyhow::{anyhow, Result as AnyResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::attributes::NotificationAttributes;
use super::dispatcher::{FireReport, NotificationDispatcher};
use super::grouper::{Grouper, MAX_GROUPED_NOTIFICATIONS};
use super::scheduler::{CancelOutcome, Scheduler};
use crate::config::Config;
use crate::error::{NotifyError, Result};
use crate::host::{
    ActiveNotificationQuery, FileForeground, ForegroundStateProvider, JsonFileStore, KeyValueStore,
    MemoryStore, NotificationCenter, Presenter, StaticForeground, TimerMode, TimerService,
};

/// 引擎构建器
pub struct EngineBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    timer: Option<Arc<dyn TimerService>>,
    presenter: Option<Arc<dyn Presenter>>,
    active: Option<Arc<dyn ActiveNotificationQuery>>,
    foreground: Option<Arc<dyn ForegroundStateProvider>>,
    timer_mode: TimerMode,
    max_grouped: usize,
    dry_run: bool,
}

impl EngineBuilder {
    /// 创建空的构建器
    pub fn new() -> Self {
        Self {
            store: None,
            timer: None,
            presenter: None,
            active: None,
            foreground: None,
            timer_mode: TimerMode::Exact,
            max_grouped: MAX_GROUPED_NOTIFICATIONS,
            dry_run: false,
        }
    }

    /// 按配置创建：文件存储、带日志的通知中心、文件前台状态
    pub fn from_config(config: &Config) -> Self {
        let mut center = NotificationCenter::new();
        if config.journal {
            center = center.with_journal(config.journal_path());
        }
        Self::new()
            .store(Arc::new(JsonFileStore::new(config.store_path())))
            .tray(Arc::new(center))
            .foreground(Arc::new(FileForeground::new(config.foreground_path())))
            .timer_mode(config.timer_mode)
            .max_grouped(config.max_grouped_notifications)
    }

    /// 设置键值存储
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 设置定时器（必填）
    pub fn timer(mut self, timer: Arc<dyn TimerService>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// 设置展示层，需要与 `active_query` 一起设置
    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// 设置活动通知查询
    pub fn active_query(mut self, active: Arc<dyn ActiveNotificationQuery>) -> Self {
        self.active = Some(active);
        self
    }

    /// 同一个对象同时作为展示层和活动通知查询
    pub fn tray<T>(self, tray: Arc<T>) -> Self
    where
        T: Presenter + ActiveNotificationQuery + 'static,
    {
        let active: Arc<dyn ActiveNotificationQuery> = tray.clone();
        self.presenter(tray).active_query(active)
    }

    /// 设置前台状态来源
    pub fn foreground(mut self, foreground: Arc<dyn ForegroundStateProvider>) -> Self {
        self.foreground = Some(foreground);
        self
    }

    /// 设置定时器精度
    pub fn timer_mode(mut self, mode: TimerMode) -> Self {
        self.timer_mode = mode;
        self
    }

    /// 设置通用分组最多显示的行数
    pub fn max_grouped(mut self, max_grouped: usize) -> Self {
        self.max_grouped = max_grouped;
        self
    }

    /// 设置 dry-run 模式
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 构建引擎：定时器必填，其余未设置的部分使用内存实现
    pub fn build(self) -> AnyResult<NotificationEngine> {
        let timer = self
            .timer
            .ok_or_else(|| anyhow!("a timer service is required"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);

        let (presenter, active) = match (self.presenter, self.active) {
            (Some(presenter), Some(active)) => (presenter, active),
            (None, None) => {
                let center = Arc::new(NotificationCenter::new());
                let active: Arc<dyn ActiveNotificationQuery> = center.clone();
                let presenter: Arc<dyn Presenter> = center;
                (presenter, active)
            }
            _ => return Err(anyhow!("presenter and active query must be set together")),
        };
        let foreground = self
            .foreground
            .unwrap_or_else(|| Arc::new(StaticForeground::default()) as Arc<dyn ForegroundStateProvider>);

        let scheduler = Arc::new(Scheduler::new(store, timer).with_timer_mode(self.timer_mode));
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&scheduler),
            Arc::clone(&presenter),
            active,
            foreground,
        )
        .with_grouper(Grouper::new().with_max_grouped(self.max_grouped))
        .with_dry_run(self.dry_run);

        info!(mode = ?self.timer_mode, max_grouped = self.max_grouped, "Notification engine ready");
        Ok(NotificationEngine {
            scheduler,
            dispatcher,
            presenter,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 通知引擎
pub struct NotificationEngine {
    scheduler: Arc<Scheduler>,
    dispatcher: NotificationDispatcher,
    presenter: Arc<dyn Presenter>,
}

impl NotificationEngine {
    /// 底层调度器
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// 调度（或替换）通知
    pub fn schedule(&self, attrs: &NotificationAttributes) -> Result<()> {
        self.scheduler.schedule(attrs)
    }

    /// 取消调度，同时移除 `id` 对应的已展示通知
    pub fn cancel(&self, id: &str) -> Result<CancelOutcome> {
        let outcome = self.scheduler.cancel(id)?;
        self.dismiss_quietly(id);
        Ok(outcome)
    }

    /// 取消所有 user info 包含给定键值的通知
    pub fn cancel_matching(&self, user_info: &Map<String, Value>) -> Result<Vec<String>> {
        let cancelled = self.scheduler.cancel_matching_user_info(user_info)?;
        for id in &cancelled {
            self.dismiss_quietly(id);
        }
        Ok(cancelled)
    }

    /// 取消全部通知
    pub fn cancel_all(&self) -> Result<Vec<String>> {
        let cancelled = self.scheduler.cancel_all()?;
        for id in &cancelled {
            self.dismiss_quietly(id);
        }
        Ok(cancelled)
    }

    /// 定时器回调入口
    pub fn on_fire(&self, attrs: &NotificationAttributes) -> FireReport {
        self.dispatcher.on_fire(attrs)
    }

    /// 立即触发已持久化的通知，等同于定时器到期
    pub fn fire_now(&self, id: &str) -> Result<FireReport> {
        let attrs = self.scheduler.get(id)?;
        Ok(self.on_fire(&attrs))
    }

    /// 进程重启后重新设置所有定时器
    pub fn restore(&self) -> Result<usize> {
        self.scheduler.restore()
    }

    /// 列出所有调度记录
    pub fn list(&self) -> Result<Vec<NotificationAttributes>> {
        self.scheduler.list()
    }

    /// 读取单条调度记录
    pub fn get(&self, id: &str) -> Result<NotificationAttributes> {
        self.scheduler.get(id)
    }

    /// 移除一条已展示的通知，不影响调度
    pub fn clear(&self, key: &str) -> Result<()> {
        info!(key = %key, "Clearing notification");
        self.presenter
            .dismiss(key)
            .map_err(|e| NotifyError::collaborator("presenter", e))
    }

    /// 移除所有已展示的通知
    pub fn clear_all(&self) -> Result<()> {
        self.presenter
            .dismiss_all()
            .map_err(|e| NotifyError::collaborator("presenter", e))
    }

    fn dismiss_quietly(&self, id: &str) {
        if let Err(e) = self.presenter.dismiss(id) {
            warn!(id = %id, error = %e, "Failed to dismiss cancelled notification");
        }
    }
}
