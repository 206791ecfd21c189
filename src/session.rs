//! Per-project service objects.
//!
//! A [`ProjectSession`] owns everything tied to one project root: the tree
//! store, the flat file cache, the git overlay, pending saves and the
//! watcher. Switching projects replaces the whole session, so no state can
//! leak between roots.

use crate::buffers::{BufferId, BufferLayer};
use crate::cache::{ProjectFileCache, ScanStats};
use crate::config::Config;
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::fs::FileSystem;
use crate::git_status::{GitFileStatus, GitOverlay, GitStatusProvider};
use crate::ignore_filter::IgnoreFilter;
use crate::reconcile::{ReconcileOutcome, WatchReconciler};
use crate::recent::RecentFiles;
use crate::search::{self, SearchResults};
use crate::store::{NodeState, TreeStore};
use crate::tree::{FileEntry, FileTree};
use crate::watcher::{FileChangeEvent, FileWatcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ProjectSession {
    root: PathBuf,
    config: Config,
    fs: Arc<dyn FileSystem>,
    store: TreeStore,
    cache: ProjectFileCache,
    reconciler: WatchReconciler,
    git: GitOverlay,
    bus: EventBus,
    watcher: Option<Box<dyn FileWatcher>>,
}

impl std::fmt::Debug for ProjectSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSession")
            .field("root", &self.root)
            .field("store", &self.store)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

/// Rewrite `path` from under `old` to under `new`, if it lives there.
fn relocate(path: &Path, old: &Path, new: &Path) -> Option<PathBuf> {
    let suffix = path.strip_prefix(old).ok()?;
    if suffix.as_os_str().is_empty() {
        Some(new.to_path_buf())
    } else {
        Some(new.join(suffix))
    }
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

impl ProjectSession {
    /// Build a session without touching the disk.
    pub fn new(root: impl Into<PathBuf>, config: Config, fs: Arc<dyn FileSystem>) -> Self {
        let root = root.into();
        let filter = IgnoreFilter::for_search(config.search.hide_build_dirs);
        Self {
            store: TreeStore::new(root.clone(), fs.clone()),
            cache: ProjectFileCache::new(&config.cache, filter),
            reconciler: WatchReconciler::new(config.watcher.pending_save_window()),
            git: GitOverlay::new(&root),
            bus: EventBus::default(),
            watcher: None,
            root,
            config,
            fs,
        }
    }

    /// Build a session and load the top level of `root`.
    pub async fn open(
        root: impl Into<PathBuf>,
        config: Config,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let mut session = Self::new(root, config, fs);
        let count = session.store.load_root().await?;
        log::info!("Opened project {:?} ({} top-level entries)", session.root, count);
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tree(&self) -> &FileTree {
        self.store.tree()
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn git(&self) -> &GitOverlay {
        &self.git
    }

    pub fn reconciler(&self) -> &WatchReconciler {
        &self.reconciler
    }

    pub fn scan_stats(&self) -> &ScanStats {
        self.cache.last_scan()
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub fn node_state(&self, path: &Path) -> Option<NodeState> {
        self.store.node_state(path)
    }

    pub async fn expand(&mut self, path: &Path) -> Result<()> {
        self.store.expand(path).await
    }

    pub fn collapse(&mut self, path: &Path) -> Result<()> {
        self.store.collapse(path)
    }

    pub async fn toggle(&mut self, path: &Path) -> Result<()> {
        self.store.toggle(path).await
    }

    /// Expand every directory on the way down to `path`.
    pub async fn reveal(&mut self, path: &Path) -> Result<()> {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return Ok(());
        };
        let mut current = self.root.clone();
        self.store.expand(&current).await?;
        let components: Vec<_> = relative.components().collect();
        for component in components.iter().take(components.len().saturating_sub(1)) {
            current.push(component);
            self.store.expand(&current).await?;
        }
        Ok(())
    }

    fn shape_changed(&mut self, path: &Path) {
        self.cache.invalidate();
        self.bus.publish(EngineEvent::ProjectFilesInvalidated);
        self.bus.publish(EngineEvent::TreeChanged {
            path: path.to_path_buf(),
        });
    }

    pub async fn refresh(&mut self, path: &Path) -> Result<bool> {
        let refreshed = self.store.refresh_directory(path).await?;
        if refreshed {
            self.shape_changed(path);
        }
        Ok(refreshed)
    }

    pub fn begin_rename(&mut self, path: &Path) -> Result<()> {
        self.store.begin_rename(path)
    }

    pub fn cancel_rename(&mut self) {
        self.store.cancel_rename();
    }

    /// Rename on disk and in the tree, then retarget buffers, recent files
    /// and git lookups.
    pub async fn rename<B>(
        &mut self,
        path: &Path,
        new_name: &str,
        buffers: &mut B,
        recent: &mut RecentFiles,
    ) -> Result<PathBuf>
    where
        B: BufferLayer + ?Sized,
    {
        let new_path = self.store.rename(path, new_name).await?;
        if new_path != path {
            self.after_relocation(path, &new_path, buffers, recent);
        }
        Ok(new_path)
    }

    pub async fn move_entry<B>(
        &mut self,
        old_path: &Path,
        new_path: &Path,
        buffers: &mut B,
        recent: &mut RecentFiles,
    ) -> Result<()>
    where
        B: BufferLayer + ?Sized,
    {
        self.store.move_entry(old_path, new_path).await?;
        self.after_relocation(old_path, new_path, buffers, recent);
        Ok(())
    }

    /// Move into `target_dir` keeping the name, e.g. for a drag and drop.
    pub async fn move_into<B>(
        &mut self,
        old_path: &Path,
        target_dir: &Path,
        buffers: &mut B,
        recent: &mut RecentFiles,
    ) -> Result<PathBuf>
    where
        B: BufferLayer + ?Sized,
    {
        let new_path = self.store.move_into(old_path, target_dir).await?;
        self.after_relocation(old_path, &new_path, buffers, recent);
        Ok(new_path)
    }

    fn after_relocation<B>(
        &mut self,
        old_path: &Path,
        new_path: &Path,
        buffers: &mut B,
        recent: &mut RecentFiles,
    ) where
        B: BufferLayer + ?Sized,
    {
        let mut retargeted = 0;
        for open_path in buffers.open_buffer_paths() {
            let Some(target) = relocate(&open_path, old_path, new_path) else {
                continue;
            };
            if let Some(id) = buffers.buffer_for_path(&open_path) {
                buffers.update_buffer_path(id, &target);
                retargeted += 1;
            }
        }
        if retargeted > 0 {
            log::debug!("Retargeted {} buffers to {:?}", retargeted, new_path);
        }
        recent.rename_path(old_path, new_path);

        self.git
            .invalidate(&[old_path.to_path_buf(), new_path.to_path_buf()], &self.bus);
        self.shape_changed(&parent_of(old_path));
        if parent_of(old_path) != parent_of(new_path) {
            self.bus.publish(EngineEvent::TreeChanged {
                path: parent_of(new_path),
            });
        }
    }

    /// Delete from disk, drop the subtree, close buffers below it and forget
    /// it in the recent files.
    pub async fn delete<B>(&mut self, path: &Path, buffers: &mut B, recent: &mut RecentFiles) -> Result<usize>
    where
        B: BufferLayer + ?Sized,
    {
        self.store.delete(path).await?;
        let closed = buffers.close_buffers_for_path(path);
        recent.remove(path);
        self.git.invalidate(&[path.to_path_buf()], &self.bus);
        self.shape_changed(&parent_of(path));
        log::info!("Deleted {:?} (closed {} buffers)", path, closed);
        Ok(closed)
    }

    pub async fn begin_create(&mut self, parent: &Path, is_dir: bool) -> Result<()> {
        self.store.begin_create(parent, is_dir).await
    }

    pub async fn commit_create(&mut self, name: &str) -> Result<PathBuf> {
        let new_path = self.store.commit_create(name).await?;
        self.git.invalidate(&[new_path.clone()], &self.bus);
        self.shape_changed(&parent_of(&new_path));
        Ok(new_path)
    }

    pub fn cancel_create(&mut self) {
        self.store.cancel_create();
    }

    /// Write a buffer to disk, suppressing the watcher echo of that write.
    pub async fn save_file(&mut self, path: &Path, content: &str) -> Result<()> {
        self.reconciler.pending_saves_mut().mark(path);
        if let Err(e) = self.fs.write_file(path, content).await {
            self.reconciler.pending_saves_mut().clear(path);
            return Err(e);
        }
        self.git.invalidate(&[path.to_path_buf()], &self.bus);
        Ok(())
    }

    /// Open a file in the buffer layer and record the access.
    pub async fn open_file<B>(&mut self, path: &Path, buffers: &mut B, recent: &mut RecentFiles) -> Result<BufferId>
    where
        B: BufferLayer + ?Sized,
    {
        let id = buffers.open_buffer(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        recent.add_or_update_recent_file(path, &name);
        Ok(id)
    }

    pub async fn handle_watch_event<B>(&mut self, event: &FileChangeEvent, buffers: &mut B) -> Result<ReconcileOutcome>
    where
        B: BufferLayer + ?Sized,
    {
        self.reconciler.handle_event(event, buffers, &self.bus).await
    }

    pub async fn project_files(&mut self) -> Result<Arc<Vec<FileEntry>>> {
        self.cache
            .get_all_project_files(&self.root, self.fs.as_ref())
            .await
    }

    pub fn invalidate_project_files(&mut self) {
        self.cache.invalidate();
        self.bus.publish(EngineEvent::ProjectFilesInvalidated);
    }

    pub async fn search<B>(&mut self, query: &str, buffers: &B, recent: &RecentFiles) -> Result<SearchResults>
    where
        B: BufferLayer + ?Sized,
    {
        let files = self.project_files().await?;
        let ordered = recent.get_recent_files_ordered_by_frecency();
        Ok(search::rank(
            query,
            &files,
            &self.root,
            &buffers.open_buffer_paths(),
            &ordered,
            &self.config.search,
        ))
    }

    pub async fn refresh_git_status(&mut self, provider: &dyn GitStatusProvider) -> Result<usize> {
        let statuses = provider.get_git_status(&self.root).await?;
        let count = statuses.len();
        self.git.set_statuses(statuses, &self.bus);
        Ok(count)
    }

    pub fn git_status_for(&mut self, path: &Path) -> Option<GitFileStatus> {
        let is_dir = self
            .store
            .find(path)
            .map(|node| node.is_dir)
            .unwrap_or_else(|| self.store.tree().is_root(path));
        self.git.status_for(path, is_dir)
    }

    /// Git status of every loaded node.
    pub fn git_annotations(&mut self) -> HashMap<PathBuf, GitFileStatus> {
        self.git.annotate(self.store.tree())
    }

    /// Start streaming change events for this root from `watcher`.
    pub fn start_watching(
        &mut self,
        mut watcher: Box<dyn FileWatcher>,
    ) -> Result<mpsc::UnboundedReceiver<FileChangeEvent>> {
        self.stop_watching();
        let events = watcher.watch(&self.root)?;
        self.watcher = Some(watcher);
        Ok(events)
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn stop_watching(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    /// Stop background work. Called when the session is replaced.
    pub fn close(&mut self) {
        self.stop_watching();
        self.store.cancel_create();
        log::info!("Closed project {:?}", self.root);
    }
}

impl Drop for ProjectSession {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// Holds the active session and swaps it on project switch.
pub struct Workspace {
    config: Config,
    fs: Arc<dyn FileSystem>,
    session: Option<ProjectSession>,
}

impl Workspace {
    pub fn new(config: Config, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            config,
            fs,
            session: None,
        }
    }

    pub fn current(&self) -> Option<&ProjectSession> {
        self.session.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut ProjectSession> {
        self.session.as_mut()
    }

    /// Open `root` in a fresh session. The previous session is closed only
    /// after the new one loaded, so a failed switch keeps the old project.
    pub async fn switch_project(&mut self, root: impl Into<PathBuf>) -> Result<&mut ProjectSession> {
        let root = root.into();
        let session = ProjectSession::open(root.clone(), self.config.clone(), self.fs.clone()).await?;
        if let Some(mut previous) = self.session.take() {
            previous.close();
        }
        log::info!("Switched project to {:?}", root);
        Ok(self.session.insert(session))
    }
}
