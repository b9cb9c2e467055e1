//! 抑制判断 - 丢弃用户正在查看的群聊的消息通知
//!
//! 只有群消息会被抑制：应用在前台，且通知所属的群就是用户正在看的群。
//! 无法解析时放行，照常展示。

use tracing::{debug, warn};

use super::attributes::{parse_int, NotificationAttributes, NotificationKind};
use crate::host::{ForegroundState, NO_GROUP_IN_VIEW};

/// 抑制判断
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppressionGate;

impl SuppressionGate {
    /// 创建抑制判断
    pub fn new() -> Self {
        Self
    }

    /// 是否应该抑制这条通知
    pub fn should_suppress(&self, attrs: &NotificationAttributes, foreground: &ForegroundState) -> bool {
        if !foreground.app_in_foreground {
            return false;
        }

        let viewed_group = match Self::group_of(attrs) {
            Ok(Some(group)) => group,
            Ok(None) => return false,
            Err(reason) => {
                warn!(id = %attrs.id, %reason, "Could not evaluate suppression, showing notification");
                return false;
            }
        };

        let suppress = foreground.group_id_in_view != NO_GROUP_IN_VIEW
            && viewed_group == foreground.group_id_in_view;
        if suppress {
            debug!(id = %attrs.id, group_id = viewed_group, "Group in view, suppressing notification");
        }
        suppress
    }

    /// 群消息返回群 id，其他类别返回 `None`
    fn group_of(attrs: &NotificationAttributes) -> Result<Option<i64>, String> {
        let raw_type = match attrs.notification_type.as_deref() {
            Some(raw) => raw,
            None => return Err("missing notification_type".to_string()),
        };
        let kind = parse_int("notification_type", raw_type)
            .map(NotificationKind::from_code)
            .map_err(|e| e.to_string())?;
        if kind != NotificationKind::GroupMessage {
            return Ok(None);
        }

        let raw_group = attrs
            .group_id
            .as_deref()
            .ok_or_else(|| "missing group_id".to_string())?;
        parse_int("group_id", raw_group)
            .map(Some)
            .map_err(|e| e.to_string())
    }
}
