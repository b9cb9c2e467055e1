//! 通知内容 - 交给展示层的渲染描述

use serde::{Deserialize, Serialize};

/// 本应用所有通知共用的分组键
pub const APP_GROUP_KEY: &str = "local-notify";

/// 已展示通知携带的合并状态
///
/// 宿主的活动通知列表通过 `ActiveNotificationQuery` 返回这些数据，
/// 合并不依赖私有存储。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupExtras {
    /// 已合并的消息
    #[serde(default)]
    pub messages: Vec<String>,
    /// 与消息对应的发送者
    #[serde(default)]
    pub senders: Vec<String>,
    /// 与消息对应的时间（毫秒）
    #[serde(default)]
    pub timestamps: Vec<i64>,
    /// 点击后跳转的实体 id
    #[serde(default)]
    pub entity_id: i64,
    /// 通知类别编码
    #[serde(default)]
    pub notification_type: i64,
}

/// 会话中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 发送者
    pub sender: String,
    /// 消息内容
    pub text: String,
    /// Unix 毫秒时间戳
    pub timestamp: i64,
}

/// 展示样式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum ContentStyle {
    /// 会话：每条消息带发送者，最早的在前
    Messaging {
        conversation_title: String,
        self_name: String,
        messages: Vec<ChatMessage>,
    },
    /// 多行列表，最新的在前
    Inbox {
        summary: Option<String>,
        lines: Vec<String>,
    },
    /// 单条长文本
    BigText { text: String },
}

impl ContentStyle {
    /// 样式名
    pub fn tag(&self) -> &'static str {
        match self {
            ContentStyle::Messaging { .. } => "messaging",
            ContentStyle::Inbox { .. } => "inbox",
            ContentStyle::BigText { .. } => "big_text",
        }
    }
}

/// 与平台无关的单条通知描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    /// 展示键：分组通知为分组 id，否则为通知 id
    pub key: String,
    /// 标题
    pub title: Option<String>,
    /// 正文
    pub body: Option<String>,
    #[serde(flatten)]
    pub style: ContentStyle,
    /// 路由信息和合并状态
    pub extras: GroupExtras,
    /// 点击后是否自动移除
    pub auto_cancel: bool,
    /// 系统分组键
    pub group: Option<String>,
}
