//! schedule 命令 - 从命令行参数或 JSON 文件构建通知记录

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Args;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

use crate::notification::{NotificationAttributes, RepeatType};

/// schedule 命令参数
#[derive(Args, Debug, Default)]
pub struct ScheduleArgs {
    /// 从 JSON 文件读取完整记录（宿主载荷格式）
    #[arg(long, conflicts_with_all = ["id", "message"])]
    pub json: Option<PathBuf>,

    /// 通知 id，重复使用会替换之前的调度
    #[arg(long)]
    pub id: Option<String>,

    /// 通知正文
    #[arg(long, short)]
    pub message: Option<String>,

    /// 标题
    #[arg(long, short)]
    pub title: Option<String>,

    /// 触发时间，RFC 3339 格式（例如 2026-05-01T09:30:00+02:00）
    #[arg(long, conflicts_with = "in_secs")]
    pub at: Option<String>,

    /// 从现在起多少秒后触发
    #[arg(long)]
    pub in_secs: Option<i64>,

    /// 重复类型：none, time, minute, hour, day, week, month
    #[arg(long)]
    pub repeat: Option<String>,

    /// `--repeat time` 的间隔（毫秒）
    #[arg(long)]
    pub repeat_every_ms: Option<i64>,

    /// 分组 id
    #[arg(long)]
    pub bundle_id: Option<String>,

    /// 分组标题
    #[arg(long)]
    pub bundle_title: Option<String>,

    /// 通知类别编码（2 竞猜，3 群消息，4 好友请求）
    #[arg(long)]
    pub notification_type: Option<String>,

    /// 群 id
    #[arg(long)]
    pub group_id: Option<String>,

    /// key=value，可重复；值能按 JSON 解析时按 JSON 解析
    #[arg(long = "user-info", value_name = "KEY=VALUE")]
    pub user_info: Vec<String>,
}

impl ScheduleArgs {
    /// 构建通知记录，`now` 用于 `--in-secs`
    pub fn into_attributes(self, now: DateTime<Utc>) -> Result<NotificationAttributes> {
        if let Some(path) = &self.json {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()));
        }

        let fire_at = match (&self.at, self.in_secs) {
            (Some(at), _) => DateTime::parse_from_rfc3339(at)
                .with_context(|| format!("invalid --at value: {}", at))?
                .with_timezone(&Utc),
            (None, Some(secs)) => now + ChronoDuration::seconds(secs),
            (None, None) => return Err(anyhow!("one of --at or --in-secs is required")),
        };

        if let Some(repeat) = &self.repeat {
            // 调度时就拒绝拼错的重复类型
            repeat.parse::<RepeatType>()?;
        }

        let mut attrs = NotificationAttributes::new(
            self.id.unwrap_or_default(),
            self.message.unwrap_or_default(),
            fire_at,
        );
        attrs.title = self.title;
        attrs.repeat_type = self.repeat;
        attrs.repeat_time = self.repeat_every_ms;
        attrs.bundle_id = self.bundle_id;
        attrs.bundle_title = self.bundle_title;
        attrs.notification_type = self.notification_type;
        attrs.group_id = self.group_id;
        attrs.user_info = parse_user_info(&self.user_info)?;
        Ok(attrs)
    }
}

/// 把 `key=value` 列表解析为 JSON 对象
pub fn parse_user_info(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got {}", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}
