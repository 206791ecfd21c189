use crate::error::{ProjectTreeError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Represents a single node in the file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub expanded: bool,
    /// `None` until the directory has been read once.
    pub children: Option<Vec<FileEntry>>,
    #[serde(skip)]
    pub is_editing: bool,
    #[serde(skip)]
    pub is_new_item: bool,
    #[serde(skip)]
    pub is_renaming: bool,
}

impl FileEntry {
    /// Create a new tree node
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir,
            expanded: false,
            children: None,
            is_editing: false,
            is_new_item: false,
            is_renaming: false,
        }
    }

    /// Create a new directory node
    pub fn new_dir(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, path, true)
    }

    /// Create a new file node
    pub fn new_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, path, false)
    }

    /// Synthetic child shown while the user types the name of a new item.
    pub fn placeholder(parent: &Path, is_dir: bool) -> Self {
        let mut entry = Self::new("", parent.join(PLACEHOLDER_NAME), is_dir);
        entry.is_editing = true;
        entry.is_new_item = true;
        entry
    }

    /// Attach a loaded, sorted child list
    pub fn with_children(mut self, mut children: Vec<FileEntry>) -> Self {
        sort_entries(&mut children);
        self.children = Some(children);
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.children.is_some()
    }

    pub fn is_placeholder(&self) -> bool {
        self.is_new_item && self.is_editing
    }

    /// Find a direct child by path
    pub fn find_child(&self, path: &Path) -> Option<&FileEntry> {
        self.children
            .as_ref()
            .and_then(|children| children.iter().find(|child| child.path == path))
    }

    /// Collapse this directory node; loaded children stay in memory
    pub fn collapse(&mut self) {
        if self.is_dir {
            self.expanded = false;
        }
    }

    /// Move this node and its whole subtree under a new path
    pub fn rebase(&mut self, new_path: PathBuf) {
        let old_path = std::mem::replace(&mut self.path, new_path);
        if let Some(name) = self.path.file_name() {
            self.name = name.to_string_lossy().to_string();
        }
        if let Some(children) = self.children.as_mut() {
            for child in children {
                rewrite_prefix(child, &old_path, &self.path);
            }
        }
    }
}

const PLACEHOLDER_NAME: &str = ".__new_item__";

fn rewrite_prefix(node: &mut FileEntry, old_prefix: &Path, new_prefix: &Path) {
    if let Ok(rest) = node.path.strip_prefix(old_prefix) {
        node.path = new_prefix.join(rest);
    }
    if let Some(children) = node.children.as_mut() {
        for child in children {
            rewrite_prefix(child, old_prefix, new_prefix);
        }
    }
}

/// Directories first, then case-insensitive by name.
pub fn compare_entries(a: &FileEntry, b: &FileEntry) -> Ordering {
    match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    }
}

pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(compare_entries);
}

/// Carry `expanded`/`children` of surviving directories over into a fresh listing.
///
/// An in-progress create placeholder survives as well.
pub fn merge_children(previous: Option<Vec<FileEntry>>, fresh: Vec<FileEntry>) -> Vec<FileEntry> {
    let mut previous = previous.unwrap_or_default();
    let mut merged: Vec<FileEntry> = fresh
        .into_iter()
        .map(|mut entry| {
            if let Some(index) = previous
                .iter()
                .position(|old| old.path == entry.path && old.is_dir == entry.is_dir)
            {
                let old = previous.swap_remove(index);
                entry.expanded = old.expanded;
                entry.children = old.children;
            }
            entry
        })
        .collect();

    merged.extend(previous.into_iter().filter(FileEntry::is_placeholder));
    sort_entries(&mut merged);
    merged
}

/// Manages the file tree structure and operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTree {
    pub root_path: PathBuf,
    pub root: Vec<FileEntry>,
    pub root_loaded: bool,
}

impl FileTree {
    /// Create a new empty file tree
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            root: Vec::new(),
            root_loaded: false,
        }
    }

    pub fn is_root(&self, path: &Path) -> bool {
        path.as_os_str().is_empty() || path == self.root_path
    }

    /// Find a node by path
    pub fn find(&self, path: &Path) -> Option<&FileEntry> {
        Self::find_in(&self.root, path)
    }

    /// Find a node by path (mutable)
    pub fn find_mut(&mut self, path: &Path) -> Option<&mut FileEntry> {
        Self::find_in_mut(&mut self.root, path)
    }

    fn find_in<'a>(nodes: &'a [FileEntry], path: &Path) -> Option<&'a FileEntry> {
        for node in nodes {
            if node.path == path {
                return Some(node);
            }
            if path.starts_with(&node.path) {
                if let Some(children) = &node.children {
                    return Self::find_in(children, path);
                }
            }
        }
        None
    }

    fn find_in_mut<'a>(nodes: &'a mut [FileEntry], path: &Path) -> Option<&'a mut FileEntry> {
        for node in nodes {
            if node.path == path {
                return Some(node);
            }
            if path.starts_with(&node.path) {
                if let Some(children) = node.children.as_mut() {
                    return Self::find_in_mut(children, path);
                }
            }
        }
        None
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    /// The list that holds (or would hold) `path`: the root list or its parent's children.
    fn sibling_list_mut(&mut self, path: &Path) -> Option<&mut Vec<FileEntry>> {
        let parent = path.parent()?;
        if self.is_root(parent) {
            return Some(&mut self.root);
        }
        self.find_mut(parent).and_then(|node| node.children.as_mut())
    }

    /// Replace the root listing, keeping the state of surviving entries.
    pub fn set_root_entries(&mut self, entries: Vec<FileEntry>) {
        let previous = std::mem::take(&mut self.root);
        let previous = if self.root_loaded { Some(previous) } else { None };
        self.root = merge_children(previous, entries);
        self.root_loaded = true;
    }

    /// Insert `entry` under `parent_path` (the root list when empty or the root),
    /// forcing the parent open so the new item is visible.
    ///
    /// The parent must already be loaded; a lone child is never allowed to
    /// stand in for a directory listing.
    pub fn insert(&mut self, parent_path: &Path, entry: FileEntry) -> Result<()> {
        let list = if self.is_root(parent_path) {
            &mut self.root
        } else {
            let parent = self
                .find_mut(parent_path)
                .filter(|node| node.is_dir)
                .ok_or_else(|| ProjectTreeError::NotFound(parent_path.to_path_buf()))?;
            let Some(children) = parent.children.as_mut() else {
                return Err(ProjectTreeError::InvalidOperation(format!(
                    "{} has not been loaded",
                    parent_path.display()
                )));
            };
            parent.expanded = true;
            children
        };

        list.retain(|existing| existing.path != entry.path);
        list.push(entry);
        sort_entries(list);
        Ok(())
    }

    /// Remove the node at `path` together with its subtree.
    pub fn remove(&mut self, path: &Path) -> Option<FileEntry> {
        let list = self.sibling_list_mut(path)?;
        let index = list.iter().position(|node| node.path == path)?;
        Some(list.remove(index))
    }

    /// Swap the node at `path` for `node`, re-sorting its siblings.
    pub fn replace(&mut self, path: &Path, node: FileEntry) -> bool {
        let Some(list) = self.sibling_list_mut(path) else {
            return false;
        };
        let Some(index) = list.iter().position(|existing| existing.path == path) else {
            return false;
        };
        list[index] = node;
        sort_entries(list);
        true
    }

    /// Relocate a node in one synchronous step, keeping its expansion state.
    ///
    /// A destination directory that was never loaded needs its full
    /// `listing`: the moved node joins it and the directory opens. A
    /// destination whose own ancestors are unloaded takes the node out of view.
    pub fn move_node(
        &mut self,
        old_path: &Path,
        new_path: &Path,
        listing: Option<Vec<FileEntry>>,
    ) -> Result<()> {
        if !self.contains(old_path) {
            return Err(ProjectTreeError::NotFound(old_path.to_path_buf()));
        }
        if new_path.starts_with(old_path) {
            return Err(ProjectTreeError::InvalidOperation(format!(
                "cannot move {} into itself",
                old_path.display()
            )));
        }

        let new_parent = new_path.parent().unwrap_or(Path::new(""));
        let parent_loaded = if self.is_root(new_parent) {
            Some(true)
        } else {
            self.find(new_parent)
                .filter(|node| node.is_dir)
                .map(FileEntry::is_loaded)
        };
        if parent_loaded == Some(false) && listing.is_none() {
            return Err(ProjectTreeError::InvalidOperation(format!(
                "{} has not been loaded",
                new_parent.display()
            )));
        }

        let Some(mut node) = self.remove(old_path) else {
            return Err(ProjectTreeError::NotFound(old_path.to_path_buf()));
        };
        node.rebase(new_path.to_path_buf());

        match parent_loaded {
            Some(true) => self.insert(new_parent, node)?,
            Some(false) => {
                if let Some(parent) = self.find_mut(new_parent) {
                    let mut entries = listing.unwrap_or_default();
                    entries.retain(|entry| entry.path != node.path);
                    entries.push(node);
                    sort_entries(&mut entries);
                    parent.children = Some(entries);
                    parent.expanded = true;
                }
            }
            None => log::debug!(
                "Moved {:?} below unloaded directory {:?}",
                old_path,
                new_parent
            ),
        }
        Ok(())
    }

    /// Rename a node in place; returns its previous state for rollback.
    pub fn rename_node(&mut self, path: &Path, new_name: &str) -> Result<FileEntry> {
        let original = self
            .find(path)
            .cloned()
            .ok_or_else(|| ProjectTreeError::NotFound(path.to_path_buf()))?;
        let new_path = path.with_file_name(new_name);

        let mut renamed = original.clone();
        renamed.rebase(new_path);
        renamed.is_renaming = false;
        renamed.is_editing = false;
        self.replace(path, renamed);
        Ok(original)
    }

    /// Get visible nodes with their display depth
    pub fn visible_entries(&self) -> Vec<(&FileEntry, usize)> {
        let mut visible = Vec::new();
        Self::collect_visible(&self.root, 0, &mut visible);
        visible
    }

    fn collect_visible<'a>(
        nodes: &'a [FileEntry],
        depth: usize,
        visible: &mut Vec<(&'a FileEntry, usize)>,
    ) {
        for node in nodes {
            visible.push((node, depth));
            if node.is_dir && node.expanded {
                if let Some(children) = &node.children {
                    Self::collect_visible(children, depth + 1, visible);
                }
            }
        }
    }

    /// Get tree statistics
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        Self::collect_stats(&self.root, 0, &mut stats);
        stats
    }

    fn collect_stats(nodes: &[FileEntry], depth: usize, stats: &mut TreeStats) {
        for node in nodes {
            if node.is_dir {
                stats.directories += 1;
                if node.expanded {
                    stats.expanded_directories += 1;
                }
                if node.is_loaded() {
                    stats.loaded_directories += 1;
                }
            } else {
                stats.files += 1;
            }
            stats.total_nodes += 1;
            stats.max_depth = stats.max_depth.max(depth);

            if let Some(children) = &node.children {
                Self::collect_stats(children, depth + 1, stats);
            }
        }
    }
}

/// Statistics about the file tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub files: usize,
    pub directories: usize,
    pub expanded_directories: usize,
    pub loaded_directories: usize,
    pub max_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn sample_tree() -> FileTree {
        let mut tree = FileTree::new("/project");
        let src = FileEntry::new_dir("src", "/project/src").with_children(vec![
            FileEntry::new_file("main.rs", "/project/src/main.rs"),
            FileEntry::new_dir("utils", "/project/src/utils"),
        ]);
        tree.set_root_entries(vec![
            FileEntry::new_file("README.md", "/project/README.md"),
            src,
            FileEntry::new_file("Cargo.toml", "/project/Cargo.toml"),
        ]);
        tree
    }

    fn names(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_tree_node_creation() {
        let file_node = FileEntry::new_file("test.rs", "/p/src/test.rs");
        assert_eq!(file_node.name, "test.rs");
        assert!(!file_node.is_dir);
        assert!(!file_node.expanded);
        assert!(file_node.children.is_none());

        let dir_node = FileEntry::new_dir("src", "/p/src");
        assert!(dir_node.is_dir);
        assert!(!dir_node.is_loaded());
    }

    #[test]
    fn test_directories_sort_first_case_insensitive() {
        let mut entries = vec![
            FileEntry::new_file("b.rs", "/p/b.rs"),
            FileEntry::new_file("A.rs", "/p/A.rs"),
            FileEntry::new_dir("zeta", "/p/zeta"),
            FileEntry::new_dir("Alpha", "/p/Alpha"),
        ];
        sort_entries(&mut entries);
        assert_eq!(names(&entries), vec!["Alpha", "zeta", "A.rs", "b.rs"]);
    }

    #[test]
    fn test_find_nested() {
        let tree = sample_tree();
        assert_eq!(tree.find(Path::new("/project/src/main.rs")).unwrap().name, "main.rs");
        assert!(tree.find(Path::new("/project/nope")).is_none());
    }

    #[test]
    fn test_insert_forces_parent_open() {
        let mut tree = sample_tree();
        tree.find_mut(Path::new("/project/src/utils")).unwrap().children = Some(Vec::new());
        tree.insert(
            Path::new("/project/src/utils"),
            FileEntry::new_file("fmt.rs", "/project/src/utils/fmt.rs"),
        )
        .unwrap();

        let utils = tree.find(Path::new("/project/src/utils")).unwrap();
        assert!(utils.expanded);
        assert_eq!(utils.children.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_at_root_and_sorts() {
        let mut tree = sample_tree();
        tree.insert(Path::new(""), FileEntry::new_dir("docs", "/project/docs"))
            .unwrap();
        assert_eq!(names(&tree.root), vec!["docs", "src", "Cargo.toml", "README.md"]);
    }

    #[test]
    fn test_insert_into_unloaded_parent_is_refused() {
        let mut tree = sample_tree();
        let result = tree.insert(
            Path::new("/project/src/utils"),
            FileEntry::new_file("fmt.rs", "/project/src/utils/fmt.rs"),
        );
        assert_matches!(result, Err(ProjectTreeError::InvalidOperation(_)));
        let utils = tree.find(Path::new("/project/src/utils")).unwrap();
        assert!(!utils.expanded);
        assert!(utils.children.is_none());
    }

    #[test]
    fn test_insert_into_missing_parent_fails() {
        let mut tree = sample_tree();
        let result = tree.insert(
            Path::new("/project/missing"),
            FileEntry::new_file("x", "/project/missing/x"),
        );
        assert_matches!(result, Err(ProjectTreeError::NotFound(_)));
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = sample_tree();
        let removed = tree.remove(Path::new("/project/src")).unwrap();
        assert_eq!(removed.children.unwrap().len(), 2);
        assert!(tree.find(Path::new("/project/src/main.rs")).is_none());
    }

    #[test]
    fn test_move_node_keeps_state_and_rewrites_paths() {
        let mut tree = sample_tree();
        tree.find_mut(Path::new("/project/src")).unwrap().expanded = true;
        tree.insert(Path::new(""), FileEntry::new_dir("lib", "/project/lib").with_children(vec![]))
            .unwrap();

        tree.move_node(Path::new("/project/src"), Path::new("/project/lib/src"), None)
            .unwrap();

        assert!(tree.find(Path::new("/project/src")).is_none());
        let moved = tree.find(Path::new("/project/lib/src")).unwrap();
        assert!(moved.expanded);
        assert!(tree.find(Path::new("/project/lib/src/main.rs")).is_some());
    }

    #[test]
    fn test_move_into_itself_is_rejected() {
        let mut tree = sample_tree();
        let result = tree.move_node(
            Path::new("/project/src"),
            Path::new("/project/src/utils/src"),
            None,
        );
        assert_matches!(result, Err(ProjectTreeError::InvalidOperation(_)));
        assert!(tree.contains(Path::new("/project/src")));
    }

    #[test]
    fn test_move_into_unloaded_directory_installs_listing() {
        let mut tree = sample_tree();
        tree.find_mut(Path::new("/project/src")).unwrap().expanded = true;

        let listing = vec![FileEntry::new_file("lib.rs", "/project/src/utils/lib.rs")];
        tree.move_node(
            Path::new("/project/README.md"),
            Path::new("/project/src/utils/README.md"),
            Some(listing),
        )
        .unwrap();

        assert!(!tree.contains(Path::new("/project/README.md")));
        let utils = tree.find(Path::new("/project/src/utils")).unwrap();
        assert!(utils.expanded);
        assert_eq!(names(utils.children.as_ref().unwrap()), vec!["lib.rs", "README.md"]);
    }

    #[test]
    fn test_move_into_unloaded_directory_needs_listing() {
        let mut tree = sample_tree();
        let result = tree.move_node(
            Path::new("/project/README.md"),
            Path::new("/project/src/utils/README.md"),
            None,
        );
        assert_matches!(result, Err(ProjectTreeError::InvalidOperation(_)));
        assert!(tree.contains(Path::new("/project/README.md")));
    }

    #[test]
    fn test_rename_node_returns_original() {
        let mut tree = sample_tree();
        let original = tree
            .rename_node(Path::new("/project/src"), "source")
            .unwrap();
        assert_eq!(original.path, PathBuf::from("/project/src"));
        assert!(tree.find(Path::new("/project/source/main.rs")).is_some());

        assert!(tree.replace(Path::new("/project/source"), original));
        assert!(tree.find(Path::new("/project/src/main.rs")).is_some());
        assert!(tree.find(Path::new("/project/source")).is_none());
    }

    #[test]
    fn test_merge_children_preserves_state() {
        let mut old_src = FileEntry::new_dir("src", "/p/src")
            .with_children(vec![FileEntry::new_file("a.rs", "/p/src/a.rs")]);
        old_src.expanded = true;
        let previous = vec![old_src, FileEntry::new_file("gone.txt", "/p/gone.txt")];

        let fresh = vec![
            FileEntry::new_dir("src", "/p/src"),
            FileEntry::new_file("new.txt", "/p/new.txt"),
        ];
        let merged = merge_children(Some(previous), fresh);

        assert_eq!(names(&merged), vec!["src", "new.txt"]);
        assert!(merged[0].expanded);
        assert_eq!(merged[0].children.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_keeps_create_placeholder() {
        let parent = Path::new("/p");
        let previous = vec![FileEntry::placeholder(parent, false)];
        let merged = merge_children(Some(previous), vec![FileEntry::new_file("a", "/p/a")]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(FileEntry::is_placeholder));
    }

    #[test]
    fn test_visible_entries_respect_expansion() {
        let mut tree = sample_tree();
        assert_eq!(tree.visible_entries().len(), 3);

        tree.find_mut(Path::new("/project/src")).unwrap().expanded = true;
        let visible = tree.visible_entries();
        assert_eq!(visible.len(), 5);
        assert_eq!(visible[1].0.name, "utils");
        assert_eq!(visible[1].1, 1);

        tree.find_mut(Path::new("/project/src")).unwrap().collapse();
        assert_eq!(tree.visible_entries().len(), 3);
        assert!(tree.find(Path::new("/project/src")).unwrap().is_loaded());
    }

    #[test]
    fn test_file_tree_stats() {
        let mut tree = sample_tree();
        tree.find_mut(Path::new("/project/src")).unwrap().expanded = true;
        let stats = tree.stats();
        assert_eq!(stats.total_nodes, 5);
        assert_eq!(stats.files, 3);
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.expanded_directories, 1);
        assert_eq!(stats.loaded_directories, 1);
        assert_eq!(stats.max_depth, 1);
    }

    proptest! {
        #[test]
        fn prop_sorted_lists_put_directories_first(
            items in proptest::collection::vec(("[a-zA-Z]{1,8}", any::<bool>()), 0..40)
        ) {
            let mut entries: Vec<FileEntry> = items
                .iter()
                .map(|(name, is_dir)| FileEntry::new(name.clone(), format!("/p/{}", name), *is_dir))
                .collect();
            sort_entries(&mut entries);

            for pair in entries.windows(2) {
                prop_assert!(compare_entries(&pair[0], &pair[1]) != Ordering::Greater);
                prop_assert!(!(pair[1].is_dir && !pair[0].is_dir));
            }
        }
    }
}
