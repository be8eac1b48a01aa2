//! Shared, swappable configuration snapshot.
//!
//! Components never hold `Config` directly; they hold a `ConfigHandle` and take
//! a fresh `Arc<Config>` snapshot at the start of each unit of work, so edits
//! made through `update` (or a `reload` from disk) are picked up on the next poll.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use super::{load_config, types::Config, ConfigError};

#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<Config>>>,
    /// File backing the configuration, if any. `save` is a no-op without one.
    path: Option<PathBuf>,
}

impl ConfigHandle {
    /// In-memory handle with no backing file.
    pub fn new(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            path: None,
        }
    }

    /// Handle persisted to `path` on `save`.
    pub fn with_path(config: Config, path: impl Into<PathBuf>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            path: Some(path.into()),
        }
    }

    /// Load from `path` and keep it as the backing file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = load_config(path)?;
        Ok(Self::with_path(config, path))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current configuration. Cheap; callers keep it for the duration of one tick.
    pub fn snapshot(&self) -> Arc<Config> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Apply an edit and publish the result as the new snapshot.
    pub fn update<F, T>(&self, edit: F) -> Result<T, ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<T, ConfigError>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Config::clone(&guard);
        let out = edit(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }

    /// Re-read the backing file, replacing the snapshot.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let config = load_config(path)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        info!("Reloaded configuration from {:?}", path);
        Ok(())
    }

    /// Write the current snapshot back to the backing file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            debug!("No configuration file to save to");
            return Ok(());
        };
        let body = toml::to_string_pretty(self.snapshot().as_ref())
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        std::fs::write(path, body).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        debug!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectionConfig;
    use tempfile::TempDir;

    #[test]
    fn test_update_publishes_new_snapshot() {
        let handle = ConfigHandle::new(Config::default());
        let before = handle.snapshot();

        handle
            .update(|c| {
                c.sections.push(SectionConfig::new("tv", "/data/tv"));
                Ok(())
            })
            .unwrap();

        // Old snapshots are untouched
        assert!(before.sections.is_empty());
        assert_eq!(handle.snapshot().sections.len(), 1);
    }

    #[test]
    fn test_failed_update_keeps_snapshot() {
        let handle = ConfigHandle::new(Config::default());
        let result: Result<(), _> = handle.update(|c| {
            c.sections.push(SectionConfig::new("tv", "/data/tv"));
            Err(ConfigError::SectionNotFound("x".to_string()))
        });
        assert!(result.is_err());
        assert!(handle.snapshot().sections.is_empty());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nfetch_proper = false\n").unwrap();

        let handle = ConfigHandle::load(&path).unwrap();
        handle
            .update(|c| {
                let mut section = SectionConfig::new("tv", "/data/tv");
                section.quality_hd = Some("Show A, Show B".to_string());
                c.sections.push(section);
                Ok(())
            })
            .unwrap();
        handle.save().unwrap();

        let reloaded = ConfigHandle::load(&path).unwrap();
        let config = reloaded.snapshot();
        assert!(!config.general.fetch_proper);
        assert_eq!(
            config.sections[0].quality_hd.as_deref(),
            Some("Show A, Show B")
        );
    }

    #[test]
    fn test_save_without_path_is_noop() {
        let handle = ConfigHandle::new(Config::default());
        assert!(handle.save().is_ok());
        assert!(handle.path().is_none());
    }

    #[test]
    fn test_reload_picks_up_file_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler]\ntick_interval_ms = 1000\n").unwrap();

        let handle = ConfigHandle::load(&path).unwrap();
        let before = handle.snapshot();
        assert_eq!(before.scheduler.tick_interval_ms, 1000);

        std::fs::write(
            &path,
            "[scheduler]\ntick_interval_ms = 250\n\n[[sections]]\nname = \"tv\"\ndl_path = \"/data/tv\"\n",
        )
        .unwrap();
        handle.reload().unwrap();

        let after = handle.snapshot();
        assert_eq!(after.scheduler.tick_interval_ms, 250);
        assert_eq!(after.sections[0].name, "tv");
        assert_eq!(before.scheduler.tick_interval_ms, 1000);
    }

    #[test]
    fn test_failed_reload_keeps_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nfetch_proper = false\n").unwrap();
        let handle = ConfigHandle::load(&path).unwrap();

        std::fs::write(&path, "[general\nbroken").unwrap();
        assert!(matches!(handle.reload(), Err(ConfigError::ParseError(_))));
        assert!(!handle.snapshot().general.fetch_proper);

        assert!(ConfigHandle::new(Config::default()).reload().is_ok());
    }
}
