//! 宿主协作者 - 引擎与平台之间的接口
//!
//! 引擎只通过这些 trait 与平台交互。自带实现：
//! - [`MemoryStore`] / [`JsonFileStore`]：键值存储
//! - [`TokioTimerService`]：进程内定时唤醒，通过 channel 投递
//! - [`NotificationCenter`]：内存通知中心（展示层 + 活动通知查询）
//! - [`StaticForeground`] / [`FileForeground`]：前台状态

pub mod center;
pub mod file_store;
pub mod foreground;
pub mod memory;
pub mod timer;

pub use center::NotificationCenter;
pub use file_store::JsonFileStore;
pub use foreground::{FileForeground, StaticForeground};
pub use memory::MemoryStore;
pub use timer::{FireEvent, TokioTimerService};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::notification::attributes::NotificationAttributes;
use crate::notification::content::{GroupExtras, NotificationContent};

/// 持久化的键值存储：通知 id -> 序列化的记录
pub trait KeyValueStore: Send + Sync {
    /// 写入（覆盖）一条记录
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// 读取一条记录
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// 删除一条记录，返回键是否存在
    fn remove(&self, key: &str) -> Result<bool>;

    /// 所有键
    fn keys(&self) -> Result<Vec<String>>;
}

/// 宿主定时器的精度，原样传递
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// 精确唤醒
    #[default]
    Exact,
    /// 允许宿主合并、推迟唤醒
    BestEffort,
}

/// 宿主定时器：到时回调并携带通知载荷
///
/// 至少投递一次，可能延迟但不会提前。对已设置的 id 再次设置会替换原来的唤醒。
pub trait TimerService: Send + Sync {
    /// 设置（或替换）`id` 的定时器
    fn arm(&self, id: &str, fire_at_ms: i64, payload: &NotificationAttributes, mode: TimerMode) -> Result<()>;

    /// 取消 `id` 的定时器，不存在时不报错
    fn disarm(&self, id: &str) -> Result<()>;
}

/// 从宿主的活动通知列表读回合并状态
pub trait ActiveNotificationQuery: Send + Sync {
    /// 按展示键查找，未展示或已被移除时返回 `None`
    fn find_by_id(&self, key: &str) -> Result<Option<GroupExtras>>;
}

/// 展示层：渲染通知，负责一次性的渠道初始化
pub trait Presenter: Send + Sync {
    /// 展示（或替换）`content.key` 对应的通知
    fn present(&self, content: &NotificationContent) -> Result<()>;

    /// 移除一条已展示的通知
    fn dismiss(&self, key: &str) -> Result<()>;

    /// 移除所有已展示的通知
    fn dismiss_all(&self) -> Result<()>;
}

/// 没有正在查看的群
pub const NO_GROUP_IN_VIEW: i64 = -1;

/// 前台状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundState {
    /// 应用是否在前台
    #[serde(default)]
    pub app_in_foreground: bool,
    /// 正在查看的群 id，没有时为 [`NO_GROUP_IN_VIEW`]
    #[serde(default = "no_group")]
    pub group_id_in_view: i64,
}

fn no_group() -> i64 {
    NO_GROUP_IN_VIEW
}

impl Default for ForegroundState {
    fn default() -> Self {
        Self {
            app_in_foreground: false,
            group_id_in_view: NO_GROUP_IN_VIEW,
        }
    }
}

/// 宿主应用维护的进程级前台状态
pub trait ForegroundStateProvider: Send + Sync {
    /// 应用是否在前台
    fn is_app_in_foreground(&self) -> bool;

    /// 正在查看的群 id
    fn group_id_in_view(&self) -> i64;

    /// 一次读取两个值
    fn snapshot(&self) -> ForegroundState {
        ForegroundState {
            app_in_foreground: self.is_app_in_foreground(),
            group_id_in_view: self.group_id_in_view(),
        }
    }
}
