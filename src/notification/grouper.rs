//! 分组器 - 把新通知合并到已展示的通知中
//!
//! ## 合并策略
//! 1. 会话：分组 id + 分组标题 + 发送者 + 聊天内容 + 聊天时间。
//!    保留每条消息，最早的在前。
//! 2. 通用：分组 id + 标题 + 正文。最新的在前，最多 `max_grouped` 行，
//!    超出部分显示 `+ N more`。
//! 3. 独立：其他情况，以自身 id 单独展示。
//!
//! 之前的合并状态通过 [`ActiveNotificationQuery`] 从宿主的活动通知列表读回。
//! 用户移除通知后查询结果为空，分组重新开始。

use tracing::{debug, warn};

use super::attributes::{parse_int, NotificationAttributes};
use super::content::{ChatMessage, ContentStyle, GroupExtras, NotificationContent, APP_GROUP_KEY};
use crate::error::{NotifyError, Result};
use crate::host::ActiveNotificationQuery;

/// 通用分组默认最多显示的行数
pub const MAX_GROUPED_NOTIFICATIONS: usize = 5;

/// 会话样式中的自己
const SELF_NAME: &str = "Me";

/// 合并策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// 会话
    Conversation,
    /// 通用
    Generic,
    /// 独立
    Standalone,
}

/// 分组器
#[derive(Debug, Clone)]
pub struct Grouper {
    /// 通用分组最多显示的行数
    max_grouped: usize,
}

impl Grouper {
    /// 使用默认行数创建
    pub fn new() -> Self {
        Self {
            max_grouped: MAX_GROUPED_NOTIFICATIONS,
        }
    }

    /// 设置最多显示的行数
    pub fn with_max_grouped(mut self, max_grouped: usize) -> Self {
        self.max_grouped = max_grouped;
        self
    }

    /// 按字段选择合并策略
    pub fn strategy(attrs: &NotificationAttributes) -> MergeStrategy {
        let has = |field: &Option<String>| field.is_some();
        if has(&attrs.bundle_id)
            && has(&attrs.bundle_title)
            && has(&attrs.sender)
            && has(&attrs.chat_message)
            && has(&attrs.chat_timestamp)
        {
            MergeStrategy::Conversation
        } else if has(&attrs.bundle_id) && has(&attrs.title) && !attrs.message.is_empty() {
            MergeStrategy::Generic
        } else {
            MergeStrategy::Standalone
        }
    }

    /// 为 `attrs` 构建要展示的内容
    ///
    /// 路由字段（类别、实体 id、聊天时间）存在但无法解析，或活动通知查询失败时返回错误
    pub fn merge(
        &self,
        attrs: &NotificationAttributes,
        active: &dyn ActiveNotificationQuery,
    ) -> Result<NotificationContent> {
        let notification_type = attrs.type_code()?;
        let entity_id = attrs.entity_id()?;

        let strategy = Self::strategy(attrs);
        debug!(id = %attrs.id, ?strategy, "Merging notification");

        match (strategy, attrs.bundle_id.as_deref()) {
            (MergeStrategy::Conversation, Some(bundle_id)) => {
                let mut extras = Self::existing(active, bundle_id)?;
                extras.entity_id = entity_id;
                extras.notification_type = notification_type;
                self.conversation(attrs, bundle_id, extras)
            }
            (MergeStrategy::Generic, Some(bundle_id)) => {
                let mut extras = Self::existing(active, bundle_id)?;
                extras.entity_id = entity_id;
                extras.notification_type = notification_type;
                Ok(self.generic(attrs, bundle_id, extras))
            }
            _ => Ok(Self::standalone(attrs, entity_id, notification_type)),
        }
    }

    /// 读取 `bundle_id` 下已展示通知的合并状态
    fn existing(active: &dyn ActiveNotificationQuery, bundle_id: &str) -> Result<GroupExtras> {
        let found = active
            .find_by_id(bundle_id)
            .map_err(|e| NotifyError::collaborator("active notification query", e))?;
        Ok(found.unwrap_or_default())
    }

    /// 会话合并：追加一条消息
    fn conversation(
        &self,
        attrs: &NotificationAttributes,
        bundle_id: &str,
        mut extras: GroupExtras,
    ) -> Result<NotificationContent> {
        let sender = attrs.sender.clone().unwrap_or_default();
        let text = attrs.chat_message.clone().unwrap_or_default();
        let raw_timestamp = attrs.chat_timestamp.as_deref().unwrap_or_default();
        let timestamp = parse_int("chat_timestamp", raw_timestamp)?;

        align_conversation(&mut extras, bundle_id);
        extras.messages.push(text.clone());
        extras.senders.push(sender);
        extras.timestamps.push(timestamp);

        let messages = extras
            .messages
            .iter()
            .zip(&extras.senders)
            .zip(&extras.timestamps)
            .map(|((text, sender), timestamp)| ChatMessage {
                sender: sender.clone(),
                text: text.clone(),
                timestamp: *timestamp,
            })
            .collect();

        Ok(NotificationContent {
            key: bundle_id.to_string(),
            title: attrs.title.clone(),
            body: Some(text),
            style: ContentStyle::Messaging {
                conversation_title: attrs.bundle_title.clone().unwrap_or_default(),
                self_name: SELF_NAME.to_string(),
                messages,
            },
            extras,
            auto_cancel: attrs.auto_cancel,
            group: Some(APP_GROUP_KEY.to_string()),
        })
    }

    /// 通用合并：最新的消息放在最前
    fn generic(&self, attrs: &NotificationAttributes, bundle_id: &str, mut extras: GroupExtras) -> NotificationContent {
        extras.messages.push(attrs.message.clone());
        let lines = render_lines(&extras.messages, self.max_grouped);

        let summary = attrs
            .bundle_title
            .as_ref()
            .filter(|title| !title.is_empty())
            .cloned();

        NotificationContent {
            key: bundle_id.to_string(),
            title: attrs.title.clone(),
            body: Some(attrs.message.clone()),
            style: ContentStyle::Inbox { summary, lines },
            extras,
            auto_cancel: attrs.auto_cancel,
            group: Some(APP_GROUP_KEY.to_string()),
        }
    }

    /// 独立展示
    fn standalone(attrs: &NotificationAttributes, entity_id: i64, notification_type: i64) -> NotificationContent {
        NotificationContent {
            key: attrs.id.clone(),
            title: attrs.title.clone(),
            body: Some(attrs.message.clone()),
            style: ContentStyle::BigText {
                text: attrs.message.clone(),
            },
            extras: GroupExtras {
                entity_id,
                notification_type,
                ..GroupExtras::default()
            },
            auto_cancel: attrs.auto_cancel,
            group: None,
        }
    }
}

impl Default for Grouper {
    fn default() -> Self {
        Self::new()
    }
}

/// 最新的在前，最多 `max` 行，超出时追加 `+ N more`
pub fn render_lines(messages: &[String], max: usize) -> Vec<String> {
    let mut lines: Vec<String> = messages.iter().rev().take(max).cloned().collect();
    if messages.len() > max {
        lines.push(format!("+ {} more", messages.len() - max));
    }
    lines
}

/// 过期的读取可能返回长度不一致的列表，只保留消息、发送者、时间对齐的前缀
fn align_conversation(extras: &mut GroupExtras, bundle_id: &str) {
    let consistent = extras
        .messages
        .len()
        .min(extras.senders.len())
        .min(extras.timestamps.len());
    if consistent != extras.messages.len()
        || consistent != extras.senders.len()
        || consistent != extras.timestamps.len()
    {
        warn!(
            bundle_id = %bundle_id,
            messages = extras.messages.len(),
            senders = extras.senders.len(),
            timestamps = extras.timestamps.len(),
            "Inconsistent conversation state, truncating"
        );
        extras.messages.truncate(consistent);
        extras.senders.truncate(consistent);
        extras.timestamps.truncate(consistent);
    }
}
