//! Git status overlay: joins an externally supplied status list onto tree paths.
//!
//! Files match on exact relative path. A directory takes the status of the
//! first entry (in provider order) that lives below it; statuses are not
//! merged or counted.

use crate::error::{ProjectTreeError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::tree::FileTree;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitStatusKind {
    Modified,
    Added,
    Deleted,
    Untracked,
    Renamed,
}

impl GitStatusKind {
    /// Map one porcelain status column.
    pub fn from_porcelain(code: char) -> Option<Self> {
        match code {
            'M' | 'T' | 'U' => Some(GitStatusKind::Modified),
            'A' | 'C' => Some(GitStatusKind::Added),
            'D' => Some(GitStatusKind::Deleted),
            'R' => Some(GitStatusKind::Renamed),
            '?' => Some(GitStatusKind::Untracked),
            _ => None,
        }
    }

    pub fn label(&self) -> char {
        match self {
            GitStatusKind::Modified => 'M',
            GitStatusKind::Added => 'A',
            GitStatusKind::Deleted => 'D',
            GitStatusKind::Untracked => '?',
            GitStatusKind::Renamed => 'R',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitFileStatus {
    /// Relative to the project root, `/`-separated.
    pub path: String,
    pub status: GitStatusKind,
    pub staged: bool,
}

impl GitFileStatus {
    pub fn new(path: impl Into<String>, status: GitStatusKind, staged: bool) -> Self {
        Self {
            path: path.into(),
            status,
            staged,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitStatusProvider: Send + Sync {
    async fn get_git_status(&self, root: &Path) -> Result<Vec<GitFileStatus>>;
}

/// The one separator normalization used for both tree paths and status paths.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn normalize_relative(path: &str) -> String {
    let mut normalized = normalize_separators(path);
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized.trim_matches('/').to_string()
}

/// Parse `git status --porcelain=v1 -z` output.
///
/// `prefix` is the project root relative to the repository top level; entries
/// outside it are dropped and the rest are made relative to it.
pub fn parse_porcelain(output: &str, prefix: &str) -> Vec<GitFileStatus> {
    let prefix = normalize_relative(prefix);
    let mut records = Vec::new();
    let mut fields = output.split('\0').filter(|field| !field.is_empty());

    while let Some(field) = fields.next() {
        let mut chars = field.chars();
        let (Some(index), Some(worktree)) = (chars.next(), chars.next()) else {
            continue;
        };
        let Some(path) = field.get(3..) else {
            continue;
        };
        if index == 'R' || index == 'C' {
            // Renames and copies carry the original path as an extra field
            fields.next();
        }
        if index == '!' {
            continue;
        }

        let (code, staged) = if index == '?' {
            ('?', false)
        } else if worktree != ' ' {
            (worktree, index != ' ')
        } else {
            (index, true)
        };
        let Some(status) = GitStatusKind::from_porcelain(code) else {
            continue;
        };

        let path = normalize_relative(path);
        let relative = if prefix.is_empty() {
            Some(path)
        } else {
            path.strip_prefix(&format!("{}/", prefix)).map(str::to_string)
        };
        if let Some(relative) = relative {
            records.push(GitFileStatus::new(relative, status, staged));
        }
    }
    records
}

/// Runs the `git` CLI inside a repository discovered with `gix`.
#[derive(Debug, Clone, Default)]
pub struct GitCliStatusProvider;

impl GitCliStatusProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GitStatusProvider for GitCliStatusProvider {
    async fn get_git_status(&self, root: &Path) -> Result<Vec<GitFileStatus>> {
        let root = root.to_path_buf();
        let (root, workdir) = tokio::task::spawn_blocking(move || -> Result<(PathBuf, PathBuf)> {
            let root = std::fs::canonicalize(&root).map_err(|e| ProjectTreeError::io(&root, e))?;
            let repo = gix::discover(&root).map_err(|e| ProjectTreeError::Git(e.to_string()))?;
            let workdir = repo
                .workdir()
                .ok_or_else(|| ProjectTreeError::Git("repository has no work tree".into()))?;
            let workdir =
                std::fs::canonicalize(workdir).map_err(|e| ProjectTreeError::io(workdir, e))?;
            Ok((root, workdir))
        })
        .await
        .map_err(|e| ProjectTreeError::Git(e.to_string()))??;

        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&workdir)
            .args(["status", "--porcelain=v1", "-z", "--untracked-files=all"])
            .output()
            .await
            .map_err(|e| ProjectTreeError::io(&workdir, e))?;
        if !output.status.success() {
            return Err(ProjectTreeError::Git(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let prefix = root
            .strip_prefix(&workdir)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let records = parse_porcelain(&String::from_utf8_lossy(&output.stdout), &prefix);
        log::debug!("git status for {:?}: {} entries", root, records.len());
        Ok(records)
    }
}

/// Memoized join of a status list against absolute tree paths.
#[derive(Debug)]
pub struct GitOverlay {
    root: String,
    statuses: Vec<GitFileStatus>,
    by_path: HashMap<String, usize>,
    memo: HashMap<PathBuf, Option<GitFileStatus>>,
}

impl GitOverlay {
    pub fn new(root: &Path) -> Self {
        Self {
            root: normalize_separators(&root.to_string_lossy())
                .trim_end_matches('/')
                .to_string(),
            statuses: Vec::new(),
            by_path: HashMap::new(),
            memo: HashMap::new(),
        }
    }

    /// Replace the status list and drop every memoized lookup.
    pub fn set_statuses(&mut self, statuses: Vec<GitFileStatus>, bus: &EventBus) {
        self.statuses = statuses
            .into_iter()
            .map(|mut status| {
                status.path = normalize_relative(&status.path);
                status
            })
            .collect();
        self.by_path.clear();
        for (index, status) in self.statuses.iter().enumerate() {
            self.by_path.entry(status.path.clone()).or_insert(index);
        }
        self.memo.clear();
        bus.publish(EngineEvent::GitStatusUpdated);
    }

    pub fn statuses(&self) -> &[GitFileStatus] {
        &self.statuses
    }

    /// Path of `absolute` relative to the root, or `None` when outside it.
    pub fn relative_path(&self, absolute: &Path) -> Option<String> {
        let absolute = normalize_separators(&absolute.to_string_lossy());
        let absolute = absolute.trim_end_matches('/');
        if absolute == self.root {
            return Some(String::new());
        }
        let rest = if self.root.is_empty() {
            Some(absolute)
        } else {
            absolute
                .strip_prefix(self.root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
        };
        rest.map(normalize_relative)
    }

    /// Status for one node without touching the memo.
    pub fn lookup(&self, absolute: &Path, is_dir: bool) -> Option<GitFileStatus> {
        let relative = self.relative_path(absolute)?;
        if !is_dir {
            return self
                .by_path
                .get(&relative)
                .map(|&index| self.statuses[index].clone());
        }

        if relative.is_empty() {
            return self.statuses.first().cloned();
        }
        let prefix = format!("{}/", relative);
        self.statuses
            .iter()
            .find(|status| status.path.starts_with(&prefix))
            .cloned()
    }

    pub fn status_for(&mut self, absolute: &Path, is_dir: bool) -> Option<GitFileStatus> {
        if let Some(cached) = self.memo.get(absolute) {
            return cached.clone();
        }
        let status = self.lookup(absolute, is_dir);
        self.memo.insert(absolute.to_path_buf(), status.clone());
        status
    }

    /// Drop memoized lookups for `paths`, their ancestors and descendants.
    pub fn invalidate(&mut self, paths: &[PathBuf], bus: &EventBus) {
        self.memo.retain(|cached, _| {
            !paths
                .iter()
                .any(|path| path.starts_with(cached) || cached.starts_with(path))
        });
        bus.publish(EngineEvent::GitCacheInvalidated {
            paths: paths.to_vec(),
        });
    }

    pub fn memoized(&self, absolute: &Path) -> bool {
        self.memo.contains_key(absolute)
    }

    /// Status of every loaded node in the tree.
    pub fn annotate(&mut self, tree: &FileTree) -> HashMap<PathBuf, GitFileStatus> {
        let nodes: Vec<(PathBuf, bool)> = tree
            .visible_entries()
            .into_iter()
            .map(|(node, _)| (node.path.clone(), node.is_dir))
            .collect();
        nodes
            .into_iter()
            .filter_map(|(path, is_dir)| {
                self.status_for(&path, is_dir)
                    .map(|status| (path, status))
            })
            .collect()
    }
}
