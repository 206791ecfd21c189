//! Flat, filtered, time-limited list of every file in the project.
//!
//! Search consumers read this instead of walking the disk per keystroke.
//! Any shape change in the tree drops the cache; it is never patched.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::fs::DirectoryReader;
use crate::ignore_filter::IgnoreFilter;
use crate::tree::FileEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    root_path: PathBuf,
    files: Arc<Vec<FileEntry>>,
    timestamp: Instant,
}

/// Counters from the most recent full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub directories_read: usize,
    pub files_found: usize,
    pub ignored: usize,
    /// Directories skipped because they sit below the depth limit.
    pub depth_limit_exceeded: usize,
    pub unreadable: usize,
    pub yields: usize,
}

#[derive(Debug)]
pub struct ProjectFileCache {
    entry: Option<CacheEntry>,
    ttl: Duration,
    max_depth: usize,
    yield_every: usize,
    filter: IgnoreFilter,
    last_scan: ScanStats,
}

impl ProjectFileCache {
    pub fn new(config: &CacheConfig, filter: IgnoreFilter) -> Self {
        Self {
            entry: None,
            ttl: config.ttl(),
            max_depth: config.max_depth,
            yield_every: config.yield_every.max(1),
            filter,
            last_scan: ScanStats::default(),
        }
    }

    pub fn last_scan(&self) -> &ScanStats {
        &self.last_scan
    }

    /// True when a snapshot for `root` exists and is younger than the TTL.
    pub fn is_fresh(&self, root: &Path) -> bool {
        self.entry
            .as_ref()
            .map(|entry| entry.root_path == root && entry.timestamp.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            log::debug!("Project file cache invalidated");
        }
    }

    /// Return every non-ignored file under `root`, rescanning when stale.
    pub async fn get_all_project_files<R>(
        &mut self,
        root: &Path,
        reader: &R,
    ) -> Result<Arc<Vec<FileEntry>>>
    where
        R: DirectoryReader + ?Sized,
    {
        if self.is_fresh(root) {
            if let Some(entry) = &self.entry {
                log::debug!("Project file cache hit for {:?}", root);
                return Ok(entry.files.clone());
            }
        }

        log::debug!("Project file cache miss for {:?}, scanning", root);
        let started = Instant::now();
        let (files, stats) = self.scan(root, reader).await?;
        log::info!(
            "Scanned {:?}: {} files in {} directories ({:?})",
            root,
            files.len(),
            stats.directories_read,
            started.elapsed()
        );

        let files = Arc::new(files);
        // A newer scan simply overwrites whatever an older one stored
        self.entry = Some(CacheEntry {
            root_path: root.to_path_buf(),
            files: files.clone(),
            timestamp: Instant::now(),
        });
        self.last_scan = stats;
        Ok(files)
    }

    async fn scan<R>(&self, root: &Path, reader: &R) -> Result<(Vec<FileEntry>, ScanStats)>
    where
        R: DirectoryReader + ?Sized,
    {
        let mut stats = ScanStats::default();
        let mut files = Vec::new();
        let mut processed = 0usize;
        let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

        while let Some((dir, depth)) = stack.pop() {
            let listing = match reader.read_directory(&dir).await {
                Ok(listing) => listing,
                Err(e) if dir != root => {
                    log::warn!("Skipping unreadable directory {:?}: {}", dir, e);
                    stats.unreadable += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            stats.directories_read += 1;

            for info in listing {
                processed += 1;
                if processed % self.yield_every == 0 {
                    stats.yields += 1;
                    tokio::task::yield_now().await;
                }

                if self.filter.should_ignore(&info.name, info.is_dir) {
                    stats.ignored += 1;
                    continue;
                }

                if info.is_dir {
                    if depth + 1 > self.max_depth {
                        log::debug!("Depth limit reached, omitting {:?}", info.path);
                        stats.depth_limit_exceeded += 1;
                    } else {
                        stack.push((info.path, depth + 1));
                    }
                } else {
                    files.push(FileEntry::new_file(info.name, info.path));
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        stats.files_found = files.len();
        Ok((files, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DirEntryInfo, MemoryFileSystem, MockDirectoryReader};

    fn cache() -> ProjectFileCache {
        ProjectFileCache::new(&CacheConfig::default(), IgnoreFilter::for_search(true))
    }

    fn project() -> MemoryFileSystem {
        let fs = MemoryFileSystem::new("/p");
        fs.add_file("/p/a.ts", "");
        fs.add_file("/p/src/b.ts", "");
        fs.add_file("/p/node_modules/dep/index.js", "");
        fs.add_file("/p/.DS_Store", "");
        fs.add_file("/p/.env", "");
        fs.add_file("/p/logo.png", "");
        fs
    }

    #[tokio::test]
    async fn test_scan_filters_and_excludes_directories() {
        let fs = project();
        let mut cache = cache();
        let files = cache
            .get_all_project_files(Path::new("/p"), &fs)
            .await
            .unwrap();

        let paths: Vec<_> = files.iter().map(|f| f.path.to_string_lossy().to_string()).collect();
        assert_eq!(paths, vec!["/p/.env", "/p/a.ts", "/p/src/b.ts"]);
        assert!(files.iter().all(|f| !f.is_dir && f.children.is_none()));
        assert_eq!(cache.last_scan().ignored, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_hit_and_expiry() {
        let fs = project();
        let mut cache = cache();
        let root = Path::new("/p");

        let first = cache.get_all_project_files(root, &fs).await.unwrap();
        tokio::time::advance(Duration::from_secs(29)).await;
        let second = cache.get_all_project_files(root, &fs).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fs.read_count(root), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let third = cache.get_all_project_files(root, &fs).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(fs.read_count(root), 2);
    }

    #[tokio::test]
    async fn test_root_change_forces_rescan() {
        let fs = project();
        fs.add_file("/q/z.ts", "");
        let mut cache = cache();

        cache.get_all_project_files(Path::new("/p"), &fs).await.unwrap();
        assert!(!cache.is_fresh(Path::new("/q")));
        let files = cache.get_all_project_files(Path::new("/q"), &fs).await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_drops_snapshot() {
        let fs = project();
        let mut cache = cache();
        let root = Path::new("/p");

        cache.get_all_project_files(root, &fs).await.unwrap();
        cache.invalidate();
        assert!(!cache.is_fresh(root));
        cache.get_all_project_files(root, &fs).await.unwrap();
        assert_eq!(fs.read_count(root), 2);
    }

    #[tokio::test]
    async fn test_depth_limit_truncates_silently() {
        let fs = MemoryFileSystem::new("/p");
        let mut deep = PathBuf::from("/p");
        for level in 0..14 {
            deep.push(format!("d{}", level));
        }
        fs.add_file(deep.join("deep.ts"), "");
        fs.add_file("/p/d0/shallow.ts", "");

        let mut cache = cache();
        let files = cache.get_all_project_files(Path::new("/p"), &fs).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "shallow.ts");
        assert_eq!(cache.last_scan().depth_limit_exceeded, 1);
    }

    #[tokio::test]
    async fn test_unreadable_subdirectory_is_skipped() {
        let fs = project();
        fs.fail_on("/p/src");
        let mut cache = cache();
        let files = cache.get_all_project_files(Path::new("/p"), &fs).await.unwrap();
        assert!(files.iter().all(|f| f.name != "b.ts"));
        assert_eq!(cache.last_scan().unreadable, 1);
    }

    #[tokio::test]
    async fn test_unreadable_root_is_an_error() {
        let fs = project();
        fs.fail_on("/p");
        let mut cache = cache();
        assert!(cache.get_all_project_files(Path::new("/p"), &fs).await.is_err());
    }

    #[tokio::test]
    async fn test_large_scan_yields_periodically() {
        let mut reader = MockDirectoryReader::new();
        reader.expect_read_directory().times(1).returning(|_| {
            Ok((0..1200)
                .map(|i| DirEntryInfo::new(format!("f{}.ts", i), format!("/big/f{}.ts", i), false))
                .collect())
        });

        let mut cache = cache();
        let files = cache
            .get_all_project_files(Path::new("/big"), &reader)
            .await
            .unwrap();
        assert_eq!(files.len(), 1200);
        assert_eq!(cache.last_scan().yields, 2);
    }
}
