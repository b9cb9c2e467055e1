//! 内存通知中心
//!
//! 充当宿主的活动通知列表：已展示的通知保留到被移除，`find_by_id` 读回合并状态。
//! 可选地把每次变化追加到 JSONL 日志，超过 [`MAX_JOURNAL_RECORDS`] 条后只保留最近的记录。

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use tracing::{debug, info, warn};

use super::{ActiveNotificationQuery, Presenter};
use crate::notification::content::{GroupExtras, NotificationContent};

/// 日志最大记录数，超过后压缩
pub const MAX_JOURNAL_RECORDS: usize = 200;
/// 压缩后保留的记录数
pub const KEEP_AFTER_COMPACTION: usize = 100;
/// 每追加多少条检查一次是否需要压缩
const COMPACTION_CHECK_INTERVAL: usize = 10;

/// 日志操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalAction {
    /// 展示
    Present,
    /// 移除一条
    Dismiss,
    /// 全部移除
    DismissAll,
}

/// 一行日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    /// 记录时间
    pub ts: DateTime<Utc>,
    /// 操作
    pub action: JournalAction,
    /// 展示键，`DismissAll` 时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// 展示的内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NotificationContent>,
}

/// 内存通知中心
pub struct NotificationCenter {
    /// 已展示的通知
    active: RwLock<BTreeMap<String, NotificationContent>>,
    /// 日志文件路径
    journal: Option<PathBuf>,
    /// 本进程写入日志的次数
    journal_writes: AtomicUsize,
    /// 渠道只初始化一次
    channel: Once,
    /// 渠道名称
    channel_name: String,
}

impl NotificationCenter {
    /// 创建不写日志的通知中心
    pub fn new() -> Self {
        Self {
            active: RwLock::new(BTreeMap::new()),
            journal: None,
            journal_writes: AtomicUsize::new(0),
            channel: Once::new(),
            channel_name: "local-notify".to_string(),
        }
    }

    /// 设置日志文件
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal = Some(path.into());
        self
    }

    /// 设置渠道名称
    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    /// 读取一条已展示的通知
    pub fn active(&self, key: &str) -> Option<NotificationContent> {
        self.active.read().get(key).cloned()
    }

    /// 所有已展示通知的键
    pub fn active_keys(&self) -> Vec<String> {
        self.active.read().keys().cloned().collect()
    }

    /// 模拟用户划掉一条通知（不写日志）
    pub fn user_dismiss(&self, key: &str) {
        self.active.write().remove(key);
    }

    /// 首次展示前初始化渠道
    fn ensure_channel(&self) {
        self.channel.call_once(|| {
            info!(channel = %self.channel_name, "Notification channel initialized");
        });
    }

    /// 写一行日志，并定期检查是否需要压缩
    fn record(&self, action: JournalAction, key: Option<&str>, content: Option<&NotificationContent>) {
        let Some(path) = &self.journal else {
            return;
        };
        let record = JournalRecord {
            ts: Utc::now(),
            action,
            key: key.map(str::to_string),
            content: content.cloned(),
        };
        // 日志写入失败不影响展示
        if let Err(e) = append_journal(path, &record) {
            warn!(path = %path.display(), error = %e, "Failed to append notification journal");
            return;
        }

        let writes = self.journal_writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % COMPACTION_CHECK_INTERVAL == 0 {
            match compact_journal(path, MAX_JOURNAL_RECORDS, KEEP_AFTER_COMPACTION) {
                Ok(true) => debug!(path = %path.display(), "Notification journal compacted"),
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to compact notification journal"),
            }
        }
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for NotificationCenter {
    fn present(&self, content: &NotificationContent) -> Result<()> {
        self.ensure_channel();
        self.active.write().insert(content.key.clone(), content.clone());
        debug!(key = %content.key, style = content.style.tag(), "Notification presented");
        self.record(JournalAction::Present, Some(&content.key), Some(content));
        Ok(())
    }

    fn dismiss(&self, key: &str) -> Result<()> {
        if self.active.write().remove(key).is_some() {
            debug!(key = %key, "Notification dismissed");
        }
        self.record(JournalAction::Dismiss, Some(key), None);
        Ok(())
    }

    fn dismiss_all(&self) -> Result<()> {
        self.active.write().clear();
        info!("Clearing all notifications");
        self.record(JournalAction::DismissAll, None, None);
        Ok(())
    }
}

impl ActiveNotificationQuery for NotificationCenter {
    fn find_by_id(&self, key: &str) -> Result<Option<GroupExtras>> {
        Ok(self.active.read().get(key).map(|c| c.extras.clone()))
    }
}

/// 获取 `<journal>.lock` 的排他锁
///
/// 追加和压缩都持有这把锁，追加不会写进即将被压缩替换的文件
fn lock_journal(path: &Path) -> Result<File> {
    use fs2::FileExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path.with_extension("jsonl.lock"))?;
    lock.lock_exclusive()?;
    Ok(lock)
}

/// 追加一条记录
pub fn append_journal(path: &Path, record: &JournalRecord) -> Result<()> {
    use fs2::FileExt;

    let line = serde_json::to_string(record)?;
    let lock = lock_journal(path)?;
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{}", line));
    lock.unlock()?;
    written?;
    Ok(())
}

/// 日志超过 `max` 条时只保留最近的 `keep` 条，返回是否重写了文件
pub fn compact_journal(path: &Path, max: usize, keep: usize) -> Result<bool> {
    use fs2::FileExt;

    let lock = lock_journal(path)?;
    let result = rewrite_tail(path, max, keep);
    lock.unlock()?;
    result
}

/// 过滤无法解析的行，通过临时文件 + rename 重写
fn rewrite_tail(path: &Path, max: usize, keep: usize) -> Result<bool> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .filter(|line| serde_json::from_str::<JournalRecord>(line).is_ok())
        .collect();
    if lines.len() <= max {
        return Ok(false);
    }

    let start = lines.len().saturating_sub(keep);
    let temp_path = path.with_extension("jsonl.tmp");
    {
        let mut temp = File::create(&temp_path)?;
        for line in &lines[start..] {
            writeln!(temp, "{}", line)?;
        }
        temp.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(true)
}

/// 读取最近 `n` 条日志，最早的在前，跳过无法解析的行
pub fn read_journal(path: &Path, n: usize) -> Vec<JournalRecord> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };

    let records: Vec<JournalRecord> = BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect();

    let start = records.len().saturating_sub(n);
    records[start..].to_vec()
}
