//! 通知属性 - 调度记录及其持久化 JSON 格式

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::repeat::RepeatType;
use crate::error::{NotifyError, Result};

/// 宿主应用发送的通知类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// 竞猜 (2)
    Wager,
    /// 群消息 (3)
    GroupMessage,
    /// 好友请求 (4)
    FriendRequest,
    /// 其他类型，保留原始编码
    Other(i64),
}

impl NotificationKind {
    /// 从数字编码解析
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => NotificationKind::Wager,
            3 => NotificationKind::GroupMessage,
            4 => NotificationKind::FriendRequest,
            other => NotificationKind::Other(other),
        }
    }

    /// 数字编码
    pub fn code(&self) -> i64 {
        match self {
            NotificationKind::Wager => 2,
            NotificationKind::GroupMessage => 3,
            NotificationKind::FriendRequest => 4,
            NotificationKind::Other(code) => *code,
        }
    }
}

/// 一条调度通知的属性记录
///
/// 以 `id` 为键序列化存入键值存储。未识别的字段通过 `extra` 原样保留。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAttributes {
    /// 通知 id，也是存储键
    #[serde(default)]
    pub id: String,
    /// 通知正文
    #[serde(default)]
    pub message: String,
    /// 标题
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 触发时间，Unix 毫秒时间戳
    #[serde(default, deserialize_with = "de_millis")]
    pub fire_date: i64,
    /// 重复类型字符串，触发后才解析
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_type: Option<String>,
    /// 重复间隔（毫秒），只在 `repeatType = time` 时有意义
    #[serde(
        default,
        deserialize_with = "de_opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub repeat_time: Option<i64>,
    /// 调用方附带的数据，用于按键值批量取消
    #[serde(default)]
    pub user_info: Map<String, Value>,
    /// 分组 id，有值时参与合并
    #[serde(default, alias = "bundle_id", deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    /// 分组标题（群聊名称）
    #[serde(default, alias = "bundle_title", skip_serializing_if = "Option::is_none")]
    pub bundle_title: Option<String>,
    /// 通知类别编码
    #[serde(
        default,
        rename = "notification_type",
        deserialize_with = "de_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_type: Option<String>,
    /// 群 id（群消息）
    #[serde(default, rename = "group_id", deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// 竞猜 id
    #[serde(default, rename = "wager_id", deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub wager_id: Option<String>,
    /// 用户 id（好友请求）
    #[serde(default, rename = "user_id", deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// 聊天消息发送者
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// 聊天消息内容
    #[serde(default, rename = "chat_message", skip_serializing_if = "Option::is_none")]
    pub chat_message: Option<String>,
    /// 聊天消息时间（毫秒，字符串或数字）
    #[serde(default, rename = "chat_timestamp", deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub chat_timestamp: Option<String>,
    /// 点击后是否自动移除，默认 true
    #[serde(default = "default_auto_cancel")]
    pub auto_cancel: bool,
    /// 其他未识别字段
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_auto_cancel() -> bool {
    true
}

impl Default for NotificationAttributes {
    fn default() -> Self {
        Self {
            id: String::new(),
            message: String::new(),
            title: None,
            fire_date: 0,
            repeat_type: None,
            repeat_time: None,
            user_info: Map::new(),
            bundle_id: None,
            bundle_title: None,
            notification_type: None,
            group_id: None,
            wager_id: None,
            user_id: None,
            sender: None,
            chat_message: None,
            chat_timestamp: None,
            auto_cancel: true,
            extra: Map::new(),
        }
    }
}

impl NotificationAttributes {
    /// 创建一次性通知
    pub fn new(id: impl Into<String>, message: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            fire_date: fire_at.timestamp_millis(),
            ..Self::default()
        }
    }

    /// 设置标题
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// 设置固定单位的重复规则
    pub fn with_repeat(mut self, repeat: RepeatType) -> Self {
        self.repeat_type = Some(repeat.as_str().to_string());
        self
    }

    /// 每隔 `interval` 重复一次（设置 `repeatType = time`）
    pub fn with_repeat_every(mut self, interval: Duration) -> Self {
        self.repeat_type = Some(RepeatType::Time.as_str().to_string());
        self.repeat_time = Some(i64::try_from(interval.as_millis()).unwrap_or(i64::MAX));
        self
    }

    /// 设置分组 id 和标题
    pub fn with_bundle(mut self, bundle_id: impl Into<String>, bundle_title: Option<String>) -> Self {
        self.bundle_id = Some(bundle_id.into());
        self.bundle_title = bundle_title;
        self
    }

    /// 设置通知类别
    pub fn with_kind(mut self, kind: NotificationKind) -> Self {
        self.notification_type = Some(kind.code().to_string());
        self
    }

    /// 设置群 id
    pub fn with_group_id(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id.to_string());
        self
    }

    /// 设置聊天消息字段
    pub fn with_chat(
        mut self,
        sender: impl Into<String>,
        chat_message: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        self.sender = Some(sender.into());
        self.chat_message = Some(chat_message.into());
        self.chat_timestamp = Some(timestamp_ms.to_string());
        self
    }

    /// 追加一个 user info 键值
    pub fn with_user_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user_info.insert(key.into(), value.into());
        self
    }

    /// 校验必填字段：`message`、`id`、非零的 `fireDate`
    pub fn validate(&self) -> Result<()> {
        if self.message.is_empty() {
            return Err(NotifyError::Validation(
                "no message specified for the scheduled notification".into(),
            ));
        }
        if self.id.is_empty() {
            return Err(NotifyError::Validation(
                "no notification id specified for the scheduled notification".into(),
            ));
        }
        if self.fire_date == 0 {
            return Err(NotifyError::Validation(
                "no date specified for the scheduled notification".into(),
            ));
        }
        Ok(())
    }

    /// 触发时间，超出范围时为 `None`
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.fire_date).single()
    }

    /// `user_info` 中每个键都必须存在且值相等
    pub fn matches(&self, user_info: &Map<String, Value>) -> bool {
        user_info
            .iter()
            .all(|(key, value)| self.user_info.get(key) == Some(value))
    }

    /// 数字类别编码，缺失视为 0
    pub fn type_code(&self) -> Result<i64> {
        match self.notification_type.as_deref() {
            None => Ok(0),
            Some(raw) => parse_int("notification_type", raw),
        }
    }

    /// 通知类别
    pub fn kind(&self) -> Result<NotificationKind> {
        self.type_code().map(NotificationKind::from_code)
    }

    /// 按类别选出通知指向的实体 id
    pub fn entity_id(&self) -> Result<i64> {
        let (field, raw) = match self.kind()? {
            NotificationKind::Wager => ("wager_id", &self.wager_id),
            NotificationKind::GroupMessage => ("group_id", &self.group_id),
            NotificationKind::FriendRequest => ("user_id", &self.user_id),
            NotificationKind::Other(_) => return Ok(0),
        };
        match raw.as_deref() {
            Some(raw) => parse_int(field, raw),
            None => Err(NotifyError::InvalidField {
                field,
                value: String::new(),
            }),
        }
    }

    /// 序列化为存储格式
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(NotifyError::Serialization)
    }

    /// 从存储格式解析，`id` 用于错误信息
    pub fn from_json(id: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| NotifyError::Deserialization {
            id: id.to_string(),
            source,
        })
    }
}

/// 把字符串解析为整数，失败时返回 `InvalidField`
pub(crate) fn parse_int(field: &'static str, raw: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|_| NotifyError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

/// 宿主以浮点数传递时间，接受任何 JSON 数字
fn de_millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    Ok(de_opt_millis(deserializer)?.unwrap_or(0))
}

fn de_opt_millis<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| D::Error::custom("timestamp out of range")),
        Some(other) => Err(D::Error::custom(format!("expected number, got {}", other))),
    }
}

/// id 可能是字符串也可能是数字
fn de_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> NotificationAttributes {
        NotificationAttributes::new("42", "Dinner at 7", Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
            .with_title("Reminder")
            .with_user_info("kind", "dinner")
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert!(sample().validate().is_ok());

        let mut attrs = sample();
        attrs.message.clear();
        assert!(matches!(attrs.validate(), Err(NotifyError::Validation(_))));

        let mut attrs = sample();
        attrs.id.clear();
        assert!(matches!(attrs.validate(), Err(NotifyError::Validation(_))));

        let mut attrs = sample();
        attrs.fire_date = 0;
        assert!(matches!(attrs.validate(), Err(NotifyError::Validation(_))));
    }

    #[test]
    fn test_repeat_every_clamps_huge_intervals() {
        let attrs = sample().with_repeat_every(Duration::from_millis(90_000));
        assert_eq!(attrs.repeat_time, Some(90_000));
        assert_eq!(attrs.repeat_type.as_deref(), Some("time"));

        let attrs = sample().with_repeat_every(Duration::MAX);
        assert_eq!(attrs.repeat_time, Some(i64::MAX));
    }

    #[test]
    fn test_host_payload_with_double_fire_date_and_numeric_ids() {
        let payload = json!({
            "id": "9",
            "message": "hi",
            "fireDate": 1700000000000.0,
            "repeatType": "day",
            "bundle_id": 77,
            "notification_type": 3,
            "group_id": "12",
            "soundName": "default"
        });
        let attrs: NotificationAttributes = serde_json::from_value(payload).unwrap();

        assert_eq!(attrs.fire_date, 1_700_000_000_000);
        assert_eq!(attrs.bundle_id.as_deref(), Some("77"));
        assert_eq!(attrs.kind().unwrap(), NotificationKind::GroupMessage);
        assert_eq!(attrs.entity_id().unwrap(), 12);
        assert!(attrs.auto_cancel);
        assert_eq!(attrs.extra.get("soundName"), Some(&json!("default")));
    }

    #[test]
    fn test_persisted_shape_keeps_unknown_keys() {
        let mut attrs = sample();
        attrs.extra.insert("color".into(), json!("red"));
        let json = attrs.to_json().unwrap();
        let parsed = NotificationAttributes::from_json("42", &json).unwrap();
        assert_eq!(parsed, attrs);

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["fireDate"], json!(1_700_000_000_000i64));
        assert_eq!(value["userInfo"]["kind"], json!("dinner"));
        assert_eq!(value["color"], json!("red"));
    }

    #[test]
    fn test_corrupt_record_reports_id() {
        let err = NotificationAttributes::from_json("5", "{not json").unwrap_err();
        match err {
            NotifyError::Deserialization { id, .. } => assert_eq!(id, "5"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_user_info_matching_is_subset() {
        let attrs = sample().with_user_info("owner", 3);

        let mut query = Map::new();
        assert!(attrs.matches(&query));
        query.insert("kind".into(), json!("dinner"));
        assert!(attrs.matches(&query));
        query.insert("owner".into(), json!(3));
        assert!(attrs.matches(&query));
        query.insert("owner".into(), json!("3"));
        assert!(!attrs.matches(&query));
    }

    #[test]
    fn test_entity_id_per_kind() {
        let mut attrs = sample().with_kind(NotificationKind::Wager);
        attrs.wager_id = Some("31".into());
        assert_eq!(attrs.entity_id().unwrap(), 31);

        let mut attrs = sample().with_kind(NotificationKind::FriendRequest);
        attrs.user_id = Some("8".into());
        assert_eq!(attrs.entity_id().unwrap(), 8);

        assert_eq!(sample().entity_id().unwrap(), 0);

        let attrs = sample().with_kind(NotificationKind::GroupMessage);
        assert!(matches!(
            attrs.entity_id(),
            Err(NotifyError::InvalidField { field: "group_id", .. })
        ));

        let mut attrs = sample();
        attrs.notification_type = Some("chat".into());
        assert!(attrs.kind().is_err());
    }
}
