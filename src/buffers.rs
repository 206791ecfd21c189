//! Contract to the editor's buffer layer.
//!
//! The engine never owns buffer content; it asks the buffer layer to reload,
//! retarget or close buffers. [`BufferRegistry`] is a simple implementation
//! backed by a [`FileSystem`].

use crate::error::{ProjectTreeError, Result};
use crate::fs::FileSystem;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[async_trait]
pub trait BufferLayer: Send + Sync {
    async fn open_buffer(&mut self, path: &Path) -> Result<BufferId>;
    fn buffer_for_path(&self, path: &Path) -> Option<BufferId>;
    /// Paths of open buffers, most recently opened first.
    fn open_buffer_paths(&self) -> Vec<PathBuf>;
    async fn reload_buffer_from_disk(&mut self, id: BufferId) -> Result<()>;
    fn update_buffer_path(&mut self, id: BufferId, new_path: &Path);
    /// Close every buffer at or below `path`; returns how many were closed.
    fn close_buffers_for_path(&mut self, path: &Path) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub id: BufferId,
    pub path: PathBuf,
    pub name: String,
    pub content: String,
    pub dirty: bool,
    pub reload_count: usize,
}

pub struct BufferRegistry {
    fs: Arc<dyn FileSystem>,
    buffers: BTreeMap<BufferId, Buffer>,
    next_id: u64,
}

impl std::fmt::Debug for BufferRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRegistry")
            .field("buffers", &self.buffers.len())
            .finish()
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl BufferRegistry {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            buffers: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    /// Simulate a user edit that has not been saved yet.
    pub fn edit(&mut self, id: BufferId, content: impl Into<String>) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.content = content.into();
            buffer.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[async_trait]
impl BufferLayer for BufferRegistry {
    async fn open_buffer(&mut self, path: &Path) -> Result<BufferId> {
        if let Some(id) = self.buffer_for_path(path) {
            return Ok(id);
        }
        let content = self.fs.read_file(path).await?;
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.insert(
            id,
            Buffer {
                id,
                path: path.to_path_buf(),
                name: name_of(path),
                content,
                dirty: false,
                reload_count: 0,
            },
        );
        Ok(id)
    }

    fn buffer_for_path(&self, path: &Path) -> Option<BufferId> {
        self.buffers
            .values()
            .find(|buffer| buffer.path == path)
            .map(|buffer| buffer.id)
    }

    fn open_buffer_paths(&self) -> Vec<PathBuf> {
        self.buffers
            .values()
            .rev()
            .map(|buffer| buffer.path.clone())
            .collect()
    }

    async fn reload_buffer_from_disk(&mut self, id: BufferId) -> Result<()> {
        let path = self
            .buffers
            .get(&id)
            .map(|buffer| buffer.path.clone())
            .ok_or_else(|| ProjectTreeError::InvalidOperation(format!("unknown buffer {:?}", id)))?;
        let content = self.fs.read_file(&path).await?;

        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.content = content;
            buffer.dirty = false;
            buffer.reload_count += 1;
        }
        Ok(())
    }

    fn update_buffer_path(&mut self, id: BufferId, new_path: &Path) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.path = new_path.to_path_buf();
            buffer.name = name_of(new_path);
        }
    }

    fn close_buffers_for_path(&mut self, path: &Path) -> usize {
        let before = self.buffers.len();
        self.buffers.retain(|_, buffer| !buffer.path.starts_with(path));
        before - self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn registry() -> (Arc<MemoryFileSystem>, BufferRegistry) {
        let fs = Arc::new(MemoryFileSystem::new("/p"));
        fs.add_file("/p/a.ts", "one");
        fs.add_file("/p/src/b.ts", "two");
        let registry = BufferRegistry::new(fs.clone());
        (fs, registry)
    }

    #[tokio::test]
    async fn test_open_is_idempotent_per_path() {
        let (_fs, mut buffers) = registry();
        let first = buffers.open_buffer(Path::new("/p/a.ts")).await.unwrap();
        let second = buffers.open_buffer(Path::new("/p/a.ts")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers.get(first).unwrap().content, "one");
    }

    #[tokio::test]
    async fn test_reload_clears_dirty_flag() {
        let (fs, mut buffers) = registry();
        let id = buffers.open_buffer(Path::new("/p/a.ts")).await.unwrap();
        buffers.edit(id, "local edit");
        fs.add_file("/p/a.ts", "from disk");

        buffers.reload_buffer_from_disk(id).await.unwrap();
        let buffer = buffers.get(id).unwrap();
        assert_eq!(buffer.content, "from disk");
        assert!(!buffer.dirty);
        assert_eq!(buffer.reload_count, 1);
    }

    #[tokio::test]
    async fn test_update_path_and_close() {
        let (_fs, mut buffers) = registry();
        let a = buffers.open_buffer(Path::new("/p/a.ts")).await.unwrap();
        buffers.open_buffer(Path::new("/p/src/b.ts")).await.unwrap();

        buffers.update_buffer_path(a, Path::new("/p/c.ts"));
        assert_eq!(buffers.get(a).unwrap().name, "c.ts");
        assert_eq!(buffers.buffer_for_path(Path::new("/p/c.ts")), Some(a));
        assert_eq!(
            buffers.open_buffer_paths(),
            vec![PathBuf::from("/p/src/b.ts"), PathBuf::from("/p/c.ts")]
        );

        assert_eq!(buffers.close_buffers_for_path(Path::new("/p/src")), 1);
        assert_eq!(buffers.len(), 1);
    }
}
