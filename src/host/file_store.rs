//! 调度记录存储 - 单个 JSON 对象文件
//!
//! 格式：`scheduled.json` 中的 `{ "<id>": "<序列化的记录>", ... }`。
//! 每次修改都持有 `scheduled.json.lock` 的排他锁，读出整个表，写临时文件后
//! rename 覆盖原文件，共享数据目录的其他进程不会读到写了一半的文件。

use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::KeyValueStore;

/// id -> 序列化的记录
type Entries = BTreeMap<String, String>;

/// JSON 文件存储
pub struct JsonFileStore {
    /// 存储文件路径
    path: PathBuf,
}

impl JsonFileStore {
    /// 使用指定文件创建
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/scheduled.json`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("scheduled.json"))
    }

    /// 存储文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 锁文件路径
    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    /// 打开（必要时创建）锁文件，调用方负责加锁
    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .with_context(|| format!("opening {}", self.lock_path().display()))?;
        Ok(lock)
    }

    /// 读取整个表，文件不存在或为空时返回空表
    fn read_entries(&self) -> Result<Entries> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    /// 写临时文件后 rename 覆盖
    fn write_entries(&self, entries: &Entries) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(entries)?)
            .with_context(|| format!("writing {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    /// 在排他锁内完成读-改-写
    fn update<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> Result<T> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        let result = self.read_entries().and_then(|mut entries| {
            let out = f(&mut entries);
            self.write_entries(&entries)?;
            Ok(out)
        });

        lock.unlock()?;
        result
    }

    /// 在共享锁内读取整个表
    fn snapshot(&self) -> Result<Entries> {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let result = self.read_entries();
        lock.unlock()?;
        result
    }
}

impl KeyValueStore for JsonFileStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.snapshot()?.remove(key))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        self.update(|entries| entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.snapshot()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::in_dir(temp.path());
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.get("1").unwrap(), None);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::in_dir(temp.path());
        store.put("2", r#"{"id":"2"}"#).unwrap();
        store.put("1", r#"{"id":"1"}"#).unwrap();

        let reopened = JsonFileStore::in_dir(temp.path());
        assert_eq!(reopened.keys().unwrap(), vec!["1".to_string(), "2".to_string()]);
        assert_eq!(reopened.get("2").unwrap().as_deref(), Some(r#"{"id":"2"}"#));

        assert!(reopened.remove("2").unwrap());
        assert!(!reopened.remove("2").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["1".to_string()]);
    }

    #[test]
    fn test_corrupt_file_is_an_error_not_a_wipe() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::in_dir(temp.path());
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.keys().is_err());
        assert!(store.put("1", "x").is_err());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }
}
