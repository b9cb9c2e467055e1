//! Foreground state providers

use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ForegroundState, ForegroundStateProvider};

/// Foreground state set directly by an in-process host
#[derive(Debug, Default)]
pub struct StaticForeground {
    state: RwLock<ForegroundState>,
}

impl StaticForeground {
    pub fn new(state: ForegroundState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn set(&self, state: ForegroundState) {
        *self.state.write() = state;
    }
}

impl ForegroundStateProvider for StaticForeground {
    fn is_app_in_foreground(&self) -> bool {
        self.state.read().app_in_foreground
    }

    fn group_id_in_view(&self) -> i64 {
        self.state.read().group_id_in_view
    }

    fn snapshot(&self) -> ForegroundState {
        *self.state.read()
    }
}

/// Foreground state published by the host app as `foreground.json`
///
/// A missing or unreadable file means background with no group in view.
pub struct FileForeground {
    path: PathBuf,
}

impl FileForeground {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("foreground.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, state: &ForegroundState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }

    fn read(&self) -> ForegroundState {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return ForegroundState::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            debug!(path = %self.path.display(), error = %e, "Unreadable foreground state, assuming background");
            ForegroundState::default()
        })
    }
}

impl ForegroundStateProvider for FileForeground {
    fn is_app_in_foreground(&self) -> bool {
        self.read().app_in_foreground
    }

    fn group_id_in_view(&self) -> i64 {
        self.read().group_id_in_view
    }

    fn snapshot(&self) -> ForegroundState {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NO_GROUP_IN_VIEW;
    use tempfile::tempdir;

    #[test]
    fn test_file_foreground_defaults_to_background() {
        let temp = tempdir().unwrap();
        let provider = FileForeground::in_dir(temp.path());
        assert!(!provider.is_app_in_foreground());
        assert_eq!(provider.group_id_in_view(), NO_GROUP_IN_VIEW);

        fs::write(provider.path(), "garbage").unwrap();
        assert_eq!(provider.snapshot(), ForegroundState::default());
    }

    #[test]
    fn test_file_foreground_round_trip() {
        let temp = tempdir().unwrap();
        let provider = FileForeground::in_dir(temp.path());
        let state = ForegroundState {
            app_in_foreground: true,
            group_id_in_view: 12,
        };
        provider.write(&state).unwrap();
        assert_eq!(provider.snapshot(), state);

        fs::write(provider.path(), r#"{"appInForeground":true}"#).unwrap();
        assert_eq!(provider.group_id_in_view(), NO_GROUP_IN_VIEW);
    }

    #[test]
    fn test_static_foreground_set() {
        let provider = StaticForeground::default();
        assert!(!provider.is_app_in_foreground());
        provider.set(ForegroundState {
            app_in_foreground: true,
            group_id_in_view: 3,
        });
        assert_eq!(provider.group_id_in_view(), 3);
    }
}
