//! 引擎错误类型
//!
//! 每个错误只影响产生它的那次操作。协作者（存储、定时器、展示层、活动通知查询）
//! 返回 `anyhow::Error`，在引擎边界统一折叠为 [`NotifyError::Collaborator`]。

use thiserror::Error;

/// 引擎操作的结果类型
pub type Result<T> = std::result::Result<T, NotifyError>;

/// 引擎错误
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 调度时必填字段缺失或为 0
    #[error("validation failed: {0}")]
    Validation(String),

    /// 无法识别的重复类型
    #[error("invalid repeat type: {0}")]
    InvalidRepeatType(String),

    /// `time` 重复类型缺少正数间隔
    #[error("repeat type is `time` but no positive repeat time was given")]
    MissingRepeatTime,

    /// 已持久化的记录无法解析
    #[error("corrupt record {id}: {source}")]
    Deserialization {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// 记录序列化失败
    #[error("failed to serialize record: {0}")]
    Serialization(#[source] serde_json::Error),

    /// 指定 id 没有调度记录
    #[error("no scheduled notification with id {0}")]
    NotFound(String),

    /// 字段存在但无法解释（例如非数字的实体 id，或时间计算溢出）
    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// 注入的协作者调用失败
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },
}

impl NotifyError {
    /// 包装协作者错误，保留完整上下文链
    pub fn collaborator(collaborator: &'static str, err: anyhow::Error) -> Self {
        NotifyError::Collaborator {
            collaborator,
            message: format!("{:#}", err),
        }
    }

    /// 是否只需警告级别日志（预期内的结果，不需要人工处理）
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            NotifyError::NotFound(_)
                | NotifyError::Deserialization { .. }
                | NotifyError::InvalidRepeatType(_)
                | NotifyError::MissingRepeatTime
        )
    }
}
