//! Local Notify - 本地通知调度、持久化与分组
//!
//! 调度器把通知记录写入存储并交给宿主定时器，触发时经过抑制判断、
//! 分组合并后交给展示层。所有平台相关能力都通过 `host` 中的 trait 注入。

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod notification;

pub use config::Config;
pub use error::{NotifyError, Result};
pub use host::{
    ActiveNotificationQuery, FireEvent, ForegroundState, ForegroundStateProvider, KeyValueStore,
    Presenter, TimerMode, TimerService,
};
pub use notification::{
    CancelOutcome, Delivery, EngineBuilder, FireReport, NotificationAttributes, NotificationEngine,
    RepeatType,
};
