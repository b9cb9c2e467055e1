//! 通知模块 - 调度、重复规则、抑制、分组
//!
//! # 流程
//! 1. `Scheduler::schedule` 持久化记录并设置宿主定时器
//! 2. 触发时 `NotificationDispatcher` 先做抑制判断
//! 3. `Grouper` 与宿主当前展示的通知合并
//! 4. 展示层渲染；重复通知重新调度
//!
//! # 用法
//! ```ignore
//! use local_notify::notification::{EngineBuilder, NotificationAttributes, RepeatType};
//!
//! let engine = EngineBuilder::new().timer(timer).build()?;
//! engine.schedule(&NotificationAttributes::new("1", "Stand up", at).with_repeat(RepeatType::Hour))?;
//! ```

pub mod attributes;
pub mod content;
pub mod dispatcher;
pub mod engine;
pub mod grouper;
pub mod repeat;
pub mod scheduler;
pub mod suppression;

pub use attributes::{NotificationAttributes, NotificationKind};
pub use content::{ChatMessage, ContentStyle, GroupExtras, NotificationContent};
pub use dispatcher::{Delivery, FireReport, Lifecycle, NotificationDispatcher};
pub use engine::{EngineBuilder, NotificationEngine};
pub use grouper::{Grouper, MergeStrategy, MAX_GROUPED_NOTIFICATIONS};
pub use repeat::RepeatType;
pub use scheduler::{CancelOutcome, Scheduler};
pub use suppression::SuppressionGate;
