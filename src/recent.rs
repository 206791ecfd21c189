//! Recently opened files ranked by frecency.
//!
//! The score decays with a half-life, so a file opened many times last month
//! can rank below one opened twice this morning.

use crate::config::RecentConfig;
use crate::error::{ProjectTreeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFile {
    pub path: PathBuf,
    pub name: String,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
}

impl RecentFile {
    /// `access_count × 0.5^(age_hours / half_life_hours)`
    pub fn frecency_score(&self, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
        let age_hours = (now - self.last_accessed).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let half_life = if half_life_hours > 0.0 { half_life_hours } else { 1.0 };
        self.access_count as f64 * 0.5f64.powf(age_hours / half_life)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFiles {
    files: Vec<RecentFile>,
    #[serde(skip)]
    config: RecentConfig,
}

impl Default for RecentFiles {
    fn default() -> Self {
        Self::new(RecentConfig::default())
    }
}

impl RecentFiles {
    pub fn new(config: RecentConfig) -> Self {
        Self {
            files: Vec::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&RecentFile> {
        self.files.iter().find(|file| file.path == path)
    }

    pub fn add_or_update_recent_file(&mut self, path: &Path, name: &str) {
        self.add_or_update_recent_file_at(path, name, Utc::now());
    }

    pub fn add_or_update_recent_file_at(&mut self, path: &Path, name: &str, now: DateTime<Utc>) {
        match self.files.iter_mut().find(|file| file.path == path) {
            Some(existing) => {
                existing.access_count = existing.access_count.saturating_add(1);
                existing.last_accessed = now;
                existing.name = name.to_string();
            }
            None => self.files.push(RecentFile {
                path: path.to_path_buf(),
                name: name.to_string(),
                last_accessed: now,
                access_count: 1,
            }),
        }
        self.prune(now);
    }

    /// Drop a path, e.g. after it was deleted from disk.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.files.len();
        self.files.retain(|file| !file.path.starts_with(path));
        before != self.files.len()
    }

    /// Follow a rename or move so history is not lost.
    pub fn rename_path(&mut self, old_path: &Path, new_path: &Path) {
        for file in &mut self.files {
            if let Ok(suffix) = file.path.strip_prefix(old_path) {
                file.path = if suffix.as_os_str().is_empty() {
                    new_path.to_path_buf()
                } else {
                    new_path.join(suffix)
                };
                if let Some(name) = file.path.file_name() {
                    file.name = name.to_string_lossy().to_string();
                }
            }
        }
    }

    pub fn get_recent_files_ordered_by_frecency(&self) -> Vec<RecentFile> {
        self.ordered_at(Utc::now())
    }

    pub fn ordered_at(&self, now: DateTime<Utc>) -> Vec<RecentFile> {
        let half_life = self.config.half_life_hours;
        let mut scored: Vec<(f64, &RecentFile)> = self
            .files
            .iter()
            .map(|file| (file.frecency_score(now, half_life), file))
            .collect();
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.last_accessed.cmp(&a.last_accessed))
                .then_with(|| a.path.cmp(&b.path))
        });
        scored.into_iter().map(|(_, file)| file.clone()).collect()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let half_life = self.config.half_life_hours;
        let threshold = self.config.prune_threshold;
        let before = self.files.len();
        self.files
            .retain(|file| file.frecency_score(now, half_life) >= threshold);

        if self.files.len() > self.config.max_entries {
            let keep: Vec<PathBuf> = self
                .ordered_at(now)
                .into_iter()
                .take(self.config.max_entries)
                .map(|file| file.path)
                .collect();
            self.files.retain(|file| keep.contains(&file.path));
        }

        let dropped = before - self.files.len();
        if dropped > 0 {
            log::debug!("Pruned {} recent file entries", dropped);
        }
    }

    pub fn load(path: &Path, config: RecentConfig) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ProjectTreeError::io(path, e))?;
        let files: Vec<RecentFile> = serde_json::from_str(&content)?;
        Ok(Self { files, config })
    }

    /// Load from `path`, starting empty when the file does not exist yet.
    pub fn load_or_default(path: &Path, config: RecentConfig) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(config));
        }
        Self::load(path, config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.files)?;
        std::fs::write(path, content).map_err(|e| ProjectTreeError::io(path, e))
    }
}
