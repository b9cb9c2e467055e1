//! 配置 - `~/.config/local-notify/config.json`
//!
//! 所有字段都有默认值，配置文件缺失或只写部分字段都可以。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::host::TimerMode;
use crate::notification::grouper::MAX_GROUPED_NOTIFICATIONS;

/// 引擎与 CLI 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据目录：调度存储、前台状态和展示日志都放在这里
    pub data_dir: PathBuf,
    /// 定时器精度，原样传给宿主定时器
    pub timer_mode: TimerMode,
    /// best-effort 模式下唤醒的对齐粒度（秒）
    pub best_effort_window_secs: u64,
    /// 守护进程重新读取存储的间隔（秒），用于感知其他进程的改动
    pub resync_interval_secs: u64,
    /// 通用分组最多显示的行数
    pub max_grouped_notifications: usize,
    /// 是否把展示记录追加到 `presented.jsonl`
    pub journal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            timer_mode: TimerMode::Exact,
            best_effort_window_secs: 60,
            resync_interval_secs: 30,
            max_grouped_notifications: MAX_GROUPED_NOTIFICATIONS,
            journal: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("local-notify")
}

impl Config {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("local-notify")
            .join("config.json")
    }

    /// 从 `path` 加载配置，`None` 时使用默认路径
    ///
    /// 文件不存在返回默认配置；文件格式错误返回错误
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// 调度存储文件
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("scheduled.json")
    }

    /// 前台状态文件
    pub fn foreground_path(&self) -> PathBuf {
        self.data_dir.join("foreground.json")
    }

    /// 展示日志文件
    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("presented.jsonl")
    }
}
