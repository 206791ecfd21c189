//! Command-bar file search over the project file cache.

use crate::config::SearchConfig;
use crate::fuzzy::FuzzyScorer;
use crate::git_status::normalize_separators;
use crate::recent::RecentFile;
use crate::tree::FileEntry;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: PathBuf,
    pub name: String,
    pub relative_path: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub open: Vec<SearchHit>,
    pub recent: Vec<SearchHit>,
    pub other: Vec<SearchHit>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.open.len() + self.recent.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All hits in display order.
    pub fn iter(&self) -> impl Iterator<Item = &SearchHit> {
        self.open.iter().chain(&self.recent).chain(&self.other)
    }
}

pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    normalize_separators(&relative.to_string_lossy())
        .trim_start_matches('/')
        .to_string()
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Ranks files against `query` and splits them into open / recent / other.
///
/// `recent` must already be ordered by frecency; its index is the frecency rank.
pub fn rank(
    query: &str,
    files: &[FileEntry],
    root: &Path,
    open_paths: &[PathBuf],
    recent: &[RecentFile],
    config: &SearchConfig,
) -> SearchResults {
    let open: HashSet<&Path> = open_paths.iter().map(PathBuf::as_path).collect();
    let frecency_rank: HashMap<&Path, usize> = recent
        .iter()
        .enumerate()
        .map(|(rank, file)| (file.path.as_path(), rank))
        .collect();

    if query.trim().is_empty() {
        return browse(files, root, open_paths, recent, &open, config);
    }

    let scorer = FuzzyScorer::new();
    let mut hits: Vec<SearchHit> = files
        .iter()
        .filter_map(|file| {
            let relative = relative_path(root, &file.path);
            let score = scorer
                .score(&file.name, query)
                .max(scorer.score(&relative, query));
            (score > 0.0).then(|| SearchHit {
                path: file.path.clone(),
                name: file.name.clone(),
                relative_path: relative,
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let a_open = open.contains(a.path.as_path());
                let b_open = open.contains(b.path.as_path());
                b_open.cmp(&a_open)
            })
            .then_with(|| {
                let a_rank = frecency_rank.get(a.path.as_path()).copied().unwrap_or(usize::MAX);
                let b_rank = frecency_rank.get(b.path.as_path()).copied().unwrap_or(usize::MAX);
                a_rank.cmp(&b_rank)
            })
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });

    let mut results = SearchResults::default();
    for hit in hits {
        let (bucket, cap) = if open.contains(hit.path.as_path()) {
            (&mut results.open, config.open_cap)
        } else if frecency_rank.contains_key(hit.path.as_path()) {
            (&mut results.recent, config.recent_cap)
        } else {
            (&mut results.other, config.other_cap)
        };
        if bucket.len() < cap {
            bucket.push(hit);
        }
    }
    log::debug!("Search {:?}: {} results", query, results.len());
    results
}

fn browse(
    files: &[FileEntry],
    root: &Path,
    open_paths: &[PathBuf],
    recent: &[RecentFile],
    open: &HashSet<&Path>,
    config: &SearchConfig,
) -> SearchResults {
    let hit = |path: &Path, name: String| SearchHit {
        path: path.to_path_buf(),
        name,
        relative_path: relative_path(root, path),
        score: 0.0,
    };

    let open_hits: Vec<SearchHit> = open_paths
        .iter()
        .take(config.open_cap)
        .map(|path| hit(path.as_path(), name_of(path)))
        .collect();

    let recent_hits: Vec<SearchHit> = recent
        .iter()
        .filter(|file| !open.contains(file.path.as_path()))
        .take(config.recent_cap)
        .map(|file| hit(file.path.as_path(), file.name.clone()))
        .collect();

    let recent_paths: HashSet<&Path> = recent.iter().map(|file| file.path.as_path()).collect();
    let mut other_hits: Vec<SearchHit> = files
        .iter()
        .filter(|file| {
            !open.contains(file.path.as_path()) && !recent_paths.contains(file.path.as_path())
        })
        .map(|file| hit(file.path.as_path(), file.name.clone()))
        .collect();
    other_hits.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    other_hits.truncate(config.other_cap);

    SearchResults {
        open: open_hits,
        recent: recent_hits,
        other: other_hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn files(paths: &[&str]) -> Vec<FileEntry> {
        paths
            .iter()
            .map(|path| {
                let path = PathBuf::from(path);
                FileEntry::new_file(name_of(&path), path)
            })
            .collect()
    }

    fn recent(paths: &[&str]) -> Vec<RecentFile> {
        paths
            .iter()
            .map(|path| RecentFile {
                path: PathBuf::from(path),
                name: name_of(Path::new(path)),
                last_accessed: Utc::now(),
                access_count: 1,
            })
            .collect()
    }

    #[test]
    fn test_query_ranks_name_match_first() {
        let files = files(&["/p/a.ts", "/p/src/b.ts"]);
        let results = rank("b", &files, Path::new("/p"), &[], &[], &SearchConfig::default());
        let names: Vec<_> = results.iter().map(|hit| hit.name.as_str()).collect();
        assert_eq!(names, vec!["b.ts"]);
        assert_eq!(results.other[0].relative_path, "src/b.ts");
    }

    #[test]
    fn test_buckets_and_tie_breaks() {
        let files = files(&["/p/x/util.ts", "/p/y/util.ts", "/p/z/util.ts", "/p/w/util.ts"]);
        let open = vec![PathBuf::from("/p/z/util.ts")];
        let recent = recent(&["/p/y/util.ts"]);
        let results = rank("util.ts", &files, Path::new("/p"), &open, &recent, &SearchConfig::default());

        assert_eq!(results.open.len(), 1);
        assert_eq!(results.open[0].relative_path, "z/util.ts");
        assert_eq!(results.recent[0].relative_path, "y/util.ts");
        let others: Vec<_> = results.other.iter().map(|hit| hit.relative_path.as_str()).collect();
        assert_eq!(others, vec!["w/util.ts", "x/util.ts"]);
    }

    #[test]
    fn test_caps_are_independent() {
        let paths: Vec<String> = (0..80).map(|i| format!("/p/file{:02}.ts", i)).collect();
        let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let files = files(&path_refs);
        let results = rank("file", &files, Path::new("/p"), &[], &[], &SearchConfig::default());
        assert_eq!(results.other.len(), 50);
        assert!(results.open.is_empty());
    }

    #[test]
    fn test_empty_query_browses() {
        let files = files(&["/p/c.ts", "/p/a.ts", "/p/b.ts", "/p/d.ts"]);
        let open = vec![PathBuf::from("/p/d.ts"), PathBuf::from("/p/outside-cache.log")];
        let recent = recent(&["/p/d.ts", "/p/c.ts"]);
        let results = rank("", &files, Path::new("/p"), &open, &recent, &SearchConfig::default());

        assert_eq!(results.open.len(), 2);
        let recents: Vec<_> = results.recent.iter().map(|hit| hit.name.as_str()).collect();
        assert_eq!(recents, vec!["c.ts"]);
        let others: Vec<_> = results.other.iter().map(|hit| hit.name.as_str()).collect();
        assert_eq!(others, vec!["a.ts", "b.ts"]);
    }

    #[test]
    fn test_relative_path_normalizes_separators() {
        assert_eq!(relative_path(Path::new("/p"), Path::new("/p/src/b.ts")), "src/b.ts");
        assert_eq!(relative_path(Path::new("/p"), Path::new("/other/b.ts")), "other/b.ts");
    }
}
