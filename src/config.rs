use crate::error::{ProjectTreeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub watcher: WatcherConfig,
    pub search: SearchConfig,
    pub recent: RecentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub max_depth: usize,
    pub yield_every: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
    pub pending_save_window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub hide_build_dirs: bool,
    pub open_cap: usize,
    pub recent_cap: usize,
    pub other_cap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentConfig {
    pub max_entries: usize,
    pub prune_threshold: f64,
    pub half_life_hours: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            max_depth: 10,
            yield_every: 500,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            // Must stay above the debounce so an echo of our own write lands inside it
            pending_save_window_ms: 1_500,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hide_build_dirs: true,
            open_cap: 10,
            recent_cap: 10,
            other_cap: 50,
        }
    }
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            prune_threshold: 0.05,
            half_life_hours: 72.0,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn pending_save_window(&self) -> Duration {
        Duration::from_millis(self.pending_save_window_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ProjectTreeError::io(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        log::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the default configuration.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ProjectTreeError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(30));
        assert_eq!(config.cache.max_depth, 10);
        assert_eq!(config.cache.yield_every, 500);
        assert!(config.watcher.pending_save_window() > config.watcher.debounce());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "search": { "hide_build_dirs": false } }"#).unwrap();
        assert!(!config.search.hide_build_dirs);
        assert_eq!(config.search.other_cap, 50);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");

        let mut config = Config::default();
        config.cache.ttl_ms = 5_000;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_or_default(&temp_dir.path().join("missing.json")).unwrap();
        assert_eq!(config, Config::default());
    }
}
