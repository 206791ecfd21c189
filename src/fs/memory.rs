use super::{DirEntryInfo, DirectoryReader, FileSystem};
use crate::error::{ProjectTreeError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-memory [`FileSystem`] for virtual projects and deterministic tests.
///
/// Counts directory reads per path and can be told to fail operations on
/// chosen paths.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, String>,
    read_counts: HashMap<PathBuf, usize>,
    failing: HashSet<PathBuf>,
    stalled: HashSet<PathBuf>,
}

fn io_error(path: &Path, kind: ErrorKind, message: &str) -> ProjectTreeError {
    ProjectTreeError::io(path, std::io::Error::new(kind, message.to_string()))
}

impl MemoryFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let fs = Self::default();
        fs.add_dir(root);
        fs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test must not poison every later assertion
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a directory and any missing ancestors.
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            state.dirs.insert(ancestor.to_path_buf());
        }
    }

    /// Add a file, creating its parent directories.
    pub fn add_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.lock().files.insert(path, content.into());
    }

    pub fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.dirs.contains(path) || state.files.contains_key(path)
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    pub fn read_count(&self, path: &Path) -> usize {
        self.lock().read_counts.get(path).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.lock().read_counts.values().sum()
    }

    /// Make every operation touching `path` fail with a permission error.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.lock().failing.insert(path.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Make directory reads of `path` never complete, like a hung mount.
    pub fn stall_on(&self, path: impl Into<PathBuf>) {
        self.lock().stalled.insert(path.into());
    }

    pub fn clear_stalls(&self) {
        self.lock().stalled.clear();
    }

    fn check(state: &MemoryState, path: &Path) -> Result<()> {
        if state.failing.contains(path) {
            return Err(io_error(path, ErrorKind::PermissionDenied, "injected failure"));
        }
        Ok(())
    }

    fn relocate(state: &mut MemoryState, from: &Path, to: &Path) -> Result<()> {
        Self::check(state, from)?;
        Self::check(state, to)?;
        if state.dirs.contains(to) || state.files.contains_key(to) {
            return Err(io_error(to, ErrorKind::AlreadyExists, "destination exists"));
        }
        if let Some(parent) = to.parent() {
            if !state.dirs.contains(parent) {
                return Err(io_error(parent, ErrorKind::NotFound, "no such directory"));
            }
        }

        if let Some(content) = state.files.remove(from) {
            state.files.insert(to.to_path_buf(), content);
            return Ok(());
        }
        if !state.dirs.contains(from) {
            return Err(io_error(from, ErrorKind::NotFound, "no such file or directory"));
        }

        let dirs: Vec<PathBuf> = state
            .dirs
            .iter()
            .filter(|d| d.starts_with(from))
            .cloned()
            .collect();
        for dir in dirs {
            state.dirs.remove(&dir);
            if let Ok(rest) = dir.strip_prefix(from) {
                state.dirs.insert(to.join(rest));
            }
        }
        let files: Vec<PathBuf> = state
            .files
            .keys()
            .filter(|f| f.starts_with(from))
            .cloned()
            .collect();
        for file in files {
            if let (Some(content), Ok(rest)) = (state.files.remove(&file), file.strip_prefix(from)) {
                state.files.insert(to.join(rest), content);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryReader for MemoryFileSystem {
    async fn read_directory(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let stalled = self.lock().stalled.contains(path);
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        *state.read_counts.entry(path.to_path_buf()).or_insert(0) += 1;
        Self::check(&state, path)?;
        if !state.dirs.contains(path) {
            return Err(io_error(path, ErrorKind::NotFound, "no such directory"));
        }

        let is_child = |candidate: &Path| candidate.parent() == Some(path);
        let name_of = |candidate: &Path| {
            candidate
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        };

        let mut entries: Vec<DirEntryInfo> = state
            .dirs
            .iter()
            .filter(|d| is_child(d))
            .map(|d| DirEntryInfo::new(name_of(d), d.clone(), true))
            .collect();
        entries.extend(
            state
                .files
                .keys()
                .filter(|f| is_child(f))
                .map(|f| DirEntryInfo::new(name_of(f), f.clone(), false)),
        );
        Ok(entries)
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read_file(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        Self::check(&state, path)?;
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io_error(path, ErrorKind::NotFound, "no such file"))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, path)?;
        state.files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn create_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, path)?;
        if state.files.contains_key(path) || state.dirs.contains(path) {
            return Err(io_error(path, ErrorKind::AlreadyExists, "already exists"));
        }
        state.files.insert(path.to_path_buf(), String::new());
        Ok(())
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, path)?;
        if state.files.contains_key(path) || state.dirs.contains(path) {
            return Err(io_error(path, ErrorKind::AlreadyExists, "already exists"));
        }
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    async fn delete_path(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, path)?;
        if state.files.remove(path).is_some() {
            return Ok(());
        }
        if !state.dirs.contains(path) {
            return Err(io_error(path, ErrorKind::NotFound, "no such file or directory"));
        }
        state.dirs.retain(|d| !d.starts_with(path));
        state.files.retain(|f, _| !f.starts_with(path));
        Ok(())
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock();
        Self::relocate(&mut state, from, to)
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock();
        Self::relocate(&mut state, from, to)
    }
}
