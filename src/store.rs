//! Tree Store: the canonical, lazily loaded mirror of the project tree.
//!
//! Every disk interaction is an await point; the tree itself is only touched
//! in synchronous steps after the await completes, so a reader never sees a
//! half-applied mutation.

use crate::error::{ProjectTreeError, Result};
use crate::fs::{DirEntryInfo, FileSystem};
use crate::tree::{merge_children, sort_entries, FileEntry, FileTree};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Expansion state of a directory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Collapsed,
    Loading,
    Expanded,
}

pub struct TreeStore {
    tree: FileTree,
    fs: Arc<dyn FileSystem>,
    loading: HashSet<PathBuf>,
    pending_create: Option<PathBuf>,
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore")
            .field("root", &self.tree.root_path)
            .field("loading", &self.loading)
            .field("pending_create", &self.pending_create)
            .finish()
    }
}

fn entries_from(listing: Vec<DirEntryInfo>) -> Vec<FileEntry> {
    let mut entries: Vec<FileEntry> = listing
        .into_iter()
        .map(|info| FileEntry::new(info.name, info.path, info.is_dir))
        .collect();
    sort_entries(&mut entries);
    entries
}

/// Marks a directory as loading until dropped, so a cancelled read cannot
/// leave the mark behind.
struct LoadingMark<'a> {
    loading: &'a mut HashSet<PathBuf>,
    path: PathBuf,
}

impl<'a> LoadingMark<'a> {
    fn new(loading: &'a mut HashSet<PathBuf>, path: &Path) -> Self {
        loading.insert(path.to_path_buf());
        Self {
            loading,
            path: path.to_path_buf(),
        }
    }
}

impl Drop for LoadingMark<'_> {
    fn drop(&mut self) {
        self.loading.remove(&self.path);
    }
}

/// Reject names that would escape the parent directory.
pub fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(ProjectTreeError::InvalidOperation(format!(
            "invalid name {:?}",
            name
        )));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(ProjectTreeError::InvalidOperation(format!(
            "name {:?} must not contain a path separator",
            name
        )));
    }
    Ok(())
}

impl TreeStore {
    pub fn new(root_path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            tree: FileTree::new(root_path),
            fs,
            loading: HashSet::new(),
            pending_create: None,
        }
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn root_path(&self) -> &Path {
        &self.tree.root_path
    }

    pub fn find(&self, path: &Path) -> Option<&FileEntry> {
        self.tree.find(path)
    }

    pub fn node_state(&self, path: &Path) -> Option<NodeState> {
        if self.loading.contains(path) {
            return Some(NodeState::Loading);
        }
        let node = self.tree.find(path).filter(|node| node.is_dir)?;
        Some(if node.expanded {
            NodeState::Expanded
        } else {
            NodeState::Collapsed
        })
    }

    /// Read the top-level listing of the project root.
    pub async fn load_root(&mut self) -> Result<usize> {
        let root = self.tree.root_path.clone();
        let listing = self.fs.read_directory(&root).await?;
        self.tree.set_root_entries(entries_from(listing));
        log::debug!("Loaded root {:?} with {} entries", root, self.tree.root.len());
        Ok(self.tree.root.len())
    }

    /// Expand a directory, reading it from disk the first time only.
    ///
    /// Expanding an already expanded node, a file, or a node that is
    /// currently loading does nothing.
    pub async fn expand(&mut self, path: &Path) -> Result<()> {
        if self.tree.is_root(path) {
            if !self.tree.root_loaded {
                self.load_root().await?;
            }
            return Ok(());
        }

        let node = self
            .tree
            .find_mut(path)
            .ok_or_else(|| ProjectTreeError::NotFound(path.to_path_buf()))?;
        if !node.is_dir || node.expanded || self.loading.contains(path) {
            return Ok(());
        }
        if node.is_loaded() {
            node.expanded = true;
            return Ok(());
        }

        let mark = LoadingMark::new(&mut self.loading, path);
        let result = self.fs.read_directory(path).await;
        drop(mark);
        let listing = result?;

        // The node may have been removed while the read was in flight
        let Some(node) = self.tree.find_mut(path) else {
            log::debug!("Discarding listing for vanished directory {:?}", path);
            return Ok(());
        };
        node.children = Some(merge_children(node.children.take(), entries_from(listing)));
        node.expanded = true;
        Ok(())
    }

    pub fn collapse(&mut self, path: &Path) -> Result<()> {
        let node = self
            .tree
            .find_mut(path)
            .ok_or_else(|| ProjectTreeError::NotFound(path.to_path_buf()))?;
        node.collapse();
        Ok(())
    }

    pub async fn toggle(&mut self, path: &Path) -> Result<()> {
        match self.node_state(path) {
            Some(NodeState::Expanded) => self.collapse(path),
            Some(NodeState::Collapsed) => self.expand(path).await,
            _ => Ok(()),
        }
    }

    /// Re-read an expanded directory, keeping the state of surviving children.
    ///
    /// Returns `false` when the directory is collapsed or unloaded, in which
    /// case nothing is read.
    pub async fn refresh_directory(&mut self, path: &Path) -> Result<bool> {
        if self.tree.is_root(path) {
            if !self.tree.root_loaded {
                return Ok(false);
            }
            self.load_root().await?;
            return Ok(true);
        }

        let visible = self
            .tree
            .find(path)
            .map(|node| node.is_dir && node.expanded && node.is_loaded())
            .unwrap_or(false);
        if !visible {
            return Ok(false);
        }

        let listing = self.fs.read_directory(path).await?;
        let Some(node) = self.tree.find_mut(path) else {
            return Ok(false);
        };
        node.children = Some(merge_children(node.children.take(), entries_from(listing)));
        Ok(true)
    }

    pub fn insert(&mut self, parent_path: &Path, entry: FileEntry) -> Result<()> {
        self.tree.insert(parent_path, entry)
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileEntry> {
        self.tree.remove(path)
    }

    /// Move a node on disk, then relocate it in the tree in one step.
    pub async fn move_entry(&mut self, old_path: &Path, new_path: &Path) -> Result<()> {
        if !self.tree.contains(old_path) {
            return Err(ProjectTreeError::NotFound(old_path.to_path_buf()));
        }
        if new_path.starts_with(old_path) {
            return Err(ProjectTreeError::InvalidOperation(format!(
                "cannot move {} into itself",
                old_path.display()
            )));
        }

        // A never-loaded destination is listed before anything changes
        let new_parent = new_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let destination_unloaded = !self.tree.is_root(&new_parent)
            && self
                .tree
                .find(&new_parent)
                .map(|node| node.is_dir && !node.is_loaded())
                .unwrap_or(false);
        let listing = if destination_unloaded {
            Some(entries_from(self.fs.read_directory(&new_parent).await?))
        } else {
            None
        };

        self.fs.move_file(old_path, new_path).await?;
        self.tree.move_node(old_path, new_path, listing)?;
        log::info!("Moved {:?} -> {:?}", old_path, new_path);
        Ok(())
    }

    /// Move a node into `target_dir`, keeping its name.
    pub async fn move_into(&mut self, old_path: &Path, target_dir: &Path) -> Result<PathBuf> {
        let name = old_path
            .file_name()
            .ok_or_else(|| ProjectTreeError::InvalidOperation("cannot move the root".into()))?;
        let target = if self.tree.is_root(target_dir) {
            self.tree.root_path.clone()
        } else {
            target_dir.to_path_buf()
        };
        let new_path = target.join(name);
        self.move_entry(old_path, &new_path).await?;
        Ok(new_path)
    }

    /// Rename a node in place. A failed disk rename restores the original
    /// node as it was, rename editor included.
    pub async fn rename(&mut self, path: &Path, new_name: &str) -> Result<PathBuf> {
        validate_name(new_name)?;
        let new_name = new_name.trim();
        let new_path = path.with_file_name(new_name);
        if new_path == path {
            self.cancel_rename();
            return Ok(new_path);
        }
        if self.tree.contains(&new_path) {
            return Err(ProjectTreeError::InvalidOperation(format!(
                "{} already exists",
                new_path.display()
            )));
        }

        let original = self.tree.rename_node(path, new_name)?;
        if let Err(e) = self.fs.rename_file(path, &new_path).await {
            log::warn!("Rename {:?} -> {:?} failed, rolling back: {}", path, new_path, e);
            self.tree.replace(&new_path, original);
            return Err(e);
        }
        Ok(new_path)
    }

    /// Delete a node from disk and drop its subtree.
    pub async fn delete(&mut self, path: &Path) -> Result<()> {
        if self.tree.is_root(path) {
            return Err(ProjectTreeError::InvalidOperation(
                "cannot delete the project root".into(),
            ));
        }
        self.fs.delete_path(path).await?;
        self.tree.remove(path);
        Ok(())
    }

    /// Show an inline placeholder for a new file or directory under `parent`.
    pub async fn begin_create(&mut self, parent: &Path, is_dir: bool) -> Result<()> {
        self.cancel_create();

        let parent = if self.tree.is_root(parent) {
            self.tree.root_path.clone()
        } else {
            parent.to_path_buf()
        };
        // Load the parent first so the placeholder never sits in a partial listing
        self.expand(&parent).await?;

        let placeholder = FileEntry::placeholder(&parent, is_dir);
        let placeholder_path = placeholder.path.clone();
        self.tree.insert(&parent, placeholder)?;
        self.pending_create = Some(placeholder_path);
        Ok(())
    }

    pub fn pending_create(&self) -> Option<&Path> {
        self.pending_create.as_deref()
    }

    /// Create the pending item on disk and replace the placeholder with it.
    pub async fn commit_create(&mut self, name: &str) -> Result<PathBuf> {
        let placeholder_path = self.pending_create.take().ok_or_else(|| {
            ProjectTreeError::InvalidOperation("no create in progress".into())
        })?;
        let is_dir = self
            .tree
            .find(&placeholder_path)
            .map(|node| node.is_dir)
            .unwrap_or(false);
        self.tree.remove(&placeholder_path);

        validate_name(name)?;
        let parent = placeholder_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.tree.root_path.clone());
        let new_path = parent.join(name.trim());
        if self.tree.contains(&new_path) {
            return Err(ProjectTreeError::InvalidOperation(format!(
                "{} already exists",
                new_path.display()
            )));
        }

        if is_dir {
            self.fs.create_directory(&new_path).await?;
        } else {
            self.fs.create_file(&new_path).await?;
        }

        let mut entry = FileEntry::new(name.trim(), new_path.clone(), is_dir);
        if is_dir {
            // A directory we just created is known to be empty
            entry.children = Some(Vec::new());
        }
        self.tree.insert(&parent, entry)?;
        Ok(new_path)
    }

    pub fn cancel_create(&mut self) {
        if let Some(path) = self.pending_create.take() {
            self.tree.remove(&path);
        }
    }

    pub fn begin_rename(&mut self, path: &Path) -> Result<()> {
        self.cancel_rename();
        let node = self
            .tree
            .find_mut(path)
            .ok_or_else(|| ProjectTreeError::NotFound(path.to_path_buf()))?;
        node.is_renaming = true;
        node.is_editing = true;
        Ok(())
    }

    pub fn cancel_rename(&mut self) {
        fn clear(nodes: &mut [FileEntry]) {
            for node in nodes {
                if node.is_renaming {
                    node.is_renaming = false;
                    node.is_editing = false;
                }
                if let Some(children) = node.children.as_mut() {
                    clear(children);
                }
            }
        }
        clear(&mut self.tree.root);
    }
}
