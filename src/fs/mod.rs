//! Disk collaborators: directory listing and file primitives.
//!
//! The engine only talks to disk through these traits so that remote
//! (e.g. SSH-backed) implementations can be swapped in.

use crate::error::{ProjectTreeError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

mod memory;

pub use memory::MemoryFileSystem;

/// One immediate child returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

impl DirEntryInfo {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryReader: Send + Sync {
    /// List the immediate children of `path`.
    async fn read_directory(&self, path: &Path) -> Result<Vec<DirEntryInfo>>;
}

#[async_trait]
pub trait FileSystem: DirectoryReader {
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    async fn create_file(&self, path: &Path) -> Result<()>;
    async fn create_directory(&self, path: &Path) -> Result<()>;
    /// Remove a file or a directory together with its contents.
    async fn delete_path(&self, path: &Path) -> Result<()>;
    async fn move_file(&self, from: &Path, to: &Path) -> Result<()>;
    async fn rename_file(&self, from: &Path, to: &Path) -> Result<()>;
}

/// [`FileSystem`] backed by the local disk through `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryReader for LocalFileSystem {
    async fn read_directory(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| ProjectTreeError::io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ProjectTreeError::io(path, e))?
        {
            let entry_path = entry.path();
            // Follow symlinks so a linked directory is expandable
            let is_dir = match tokio::fs::metadata(&entry_path).await {
                Ok(metadata) => metadata.is_dir(),
                Err(_) => false,
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry_path,
                is_dir,
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_file(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProjectTreeError::io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ProjectTreeError::io(path, e))
    }

    async fn create_file(&self, path: &Path) -> Result<()> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map(|_| ())
            .map_err(|e| ProjectTreeError::io(path, e))
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir(path)
            .await
            .map_err(|e| ProjectTreeError::io(path, e))
    }

    async fn delete_path(&self, path: &Path) -> Result<()> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| ProjectTreeError::io(path, e))?;
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        result.map_err(|e| ProjectTreeError::io(path, e))
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        if tokio::fs::try_exists(to).await.unwrap_or(false) {
            return Err(ProjectTreeError::io(
                to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination exists"),
            ));
        }
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| ProjectTreeError::io(from, e))
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.move_file(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_directory_lists_children() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("src")).unwrap();
        std::fs::write(temp_dir.path().join("a.ts"), "a").unwrap();

        let fs = LocalFileSystem::new();
        let mut entries = fs.read_directory(temp_dir.path()).await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.ts");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[1].name, "src");
        assert!(entries[1].is_dir);
        assert_eq!(entries[1].path, temp_dir.path().join("src"));
    }

    #[tokio::test]
    async fn test_read_missing_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let result = fs.read_directory(&temp_dir.path().join("missing")).await;
        assert_matches!(result, Err(ProjectTreeError::Io { .. }));
    }

    #[tokio::test]
    async fn test_file_primitives() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let file = temp_dir.path().join("notes.md");

        fs.create_file(&file).await.unwrap();
        assert!(fs.create_file(&file).await.is_err());

        fs.write_file(&file, "hello").await.unwrap();
        assert_eq!(fs.read_file(&file).await.unwrap(), "hello");

        let renamed = temp_dir.path().join("readme.md");
        fs.rename_file(&file, &renamed).await.unwrap();
        assert!(!file.exists());
        assert!(renamed.exists());

        let dir = temp_dir.path().join("docs");
        fs.create_directory(&dir).await.unwrap();
        let moved = dir.join("readme.md");
        fs.move_file(&renamed, &moved).await.unwrap();
        assert!(moved.exists());

        fs.delete_path(&dir).await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_move_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        assert!(fs.move_file(&a, &b).await.is_err());
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "b");
    }
}
