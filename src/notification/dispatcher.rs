//! 通知分发器 - 把一次定时器触发变成展示出来的通知
//!
//! 每次触发：抑制判断 -> 分组合并 -> 展示，然后通过调度器处理重复规则。
//! 展示和重新调度互相独立：展示失败仍会重新调度重复通知，重新调度失败
//! 也不会撤销已经展示的通知。

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::attributes::NotificationAttributes;
use super::grouper::Grouper;
use super::scheduler::Scheduler;
use super::suppression::SuppressionGate;
use crate::error::NotifyError;
use crate::host::{ActiveNotificationQuery, ForegroundStateProvider, Presenter};

/// 通知在屏幕上的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// 用户正在看这个群聊，已抑制
    Suppressed,
    /// 已展示（或合并）到 `key` 对应的通知
    Presented { key: String },
    /// dry-run 模式：本应展示到 `key`
    Skipped { key: String },
    /// 构建或展示失败，附带原因
    Failed(String),
}

/// 触发后通知的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// 已按重复规则重新调度到该时间（毫秒）
    Rescheduled(i64),
    /// 不再触发，记录已移除
    Terminal,
}

/// 一次触发的处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct FireReport {
    /// 通知 id
    pub id: String,
    /// 展示结果
    pub delivery: Delivery,
    /// 下次触发时间（毫秒），一次性通知为 `None`
    pub next_fire: Option<i64>,
    /// 重复规则无法应用时的错误信息
    pub reschedule_error: Option<String>,
}

impl FireReport {
    /// 从 `next_fire` 推出生命周期状态
    pub fn lifecycle(&self) -> Lifecycle {
        match self.next_fire {
            Some(at) => Lifecycle::Rescheduled(at),
            None => Lifecycle::Terminal,
        }
    }
}

/// 通知分发器 - 抑制、合并、展示，再交给调度器处理重复
pub struct NotificationDispatcher {
    scheduler: Arc<Scheduler>,
    presenter: Arc<dyn Presenter>,
    active: Arc<dyn ActiveNotificationQuery>,
    foreground: Arc<dyn ForegroundStateProvider>,
    gate: SuppressionGate,
    grouper: Grouper,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl NotificationDispatcher {
    /// 创建新的分发器
    pub fn new(
        scheduler: Arc<Scheduler>,
        presenter: Arc<dyn Presenter>,
        active: Arc<dyn ActiveNotificationQuery>,
        foreground: Arc<dyn ForegroundStateProvider>,
    ) -> Self {
        Self {
            scheduler,
            presenter,
            active,
            foreground,
            gate: SuppressionGate::new(),
            grouper: Grouper::new(),
            dry_run: false,
        }
    }

    /// 替换分组器（例如自定义最大行数）
    pub fn with_grouper(mut self, grouper: Grouper) -> Self {
        self.grouper = grouper;
        self
    }

    /// 设置 dry-run 模式：完整走一遍流程但不调用展示层
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 定时器触发入口：展示，然后处理重复规则
    pub fn on_fire(&self, attrs: &NotificationAttributes) -> FireReport {
        let delivery = self.deliver(attrs);

        let (next_fire, reschedule_error) = match self.scheduler.after_fire(attrs) {
            Ok(next) => (next, None),
            Err(e) => {
                if e.is_warning() {
                    warn!(id = %attrs.id, error = %e, "Repeat rule not applied");
                } else {
                    error!(id = %attrs.id, error = %e, "Failed to reschedule notification");
                }
                (None, Some(e.to_string()))
            }
        };

        FireReport {
            id: attrs.id.clone(),
            delivery,
            next_fire,
            reschedule_error,
        }
    }

    /// 只做抑制、合并和展示，不处理重复规则
    pub fn deliver(&self, attrs: &NotificationAttributes) -> Delivery {
        let foreground = self.foreground.snapshot();
        if self.gate.should_suppress(attrs, &foreground) {
            return Delivery::Suppressed;
        }

        let content = match self.grouper.merge(attrs, self.active.as_ref()) {
            Ok(content) => content,
            Err(e) => {
                error!(id = %attrs.id, error = %e, "Failed to build notification");
                return Delivery::Failed(e.to_string());
            }
        };

        if self.dry_run {
            info!(id = %attrs.id, key = %content.key, "[DRY-RUN] Would present notification");
            return Delivery::Skipped { key: content.key };
        }

        match self.presenter.present(&content) {
            Ok(()) => {
                debug!(id = %attrs.id, key = %content.key, style = content.style.tag(), "Notification presented");
                Delivery::Presented { key: content.key }
            }
            Err(e) => {
                let e = NotifyError::collaborator("presenter", e);
                error!(id = %attrs.id, error = %e, "Failed to present notification");
                Delivery::Failed(e.to_string())
            }
        }
    }
}
