//! Visibility policy for tree and search views.
//!
//! Two separately configured filters exist: the base filter hides OS junk,
//! VCS metadata, lockfiles and binary artifacts; the search filter adds an
//! optional denylist of common build and dependency directories. The tree
//! view never applies the search denylist, so `node_modules` stays browsable.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Names and globs hidden everywhere. Dotfiles not listed here stay visible.
const DEFAULT_PATTERNS: &[&str] = &[
    // VCS metadata
    ".git",
    ".svn",
    ".hg",
    // OS junk
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "._*",
    ".Spotlight-V100",
    ".Trashes",
    "*~",
    "*.swp",
    "*.swo",
    // Lockfiles
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "composer.lock",
];

/// File extensions hidden when the entry is not a directory.
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "o", "a", "lib", "obj", "class", "pyc", "pyo", "wasm", "bin",
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "png", "jpg", "jpeg", "gif",
    "bmp", "ico", "webp", "tiff", "mp3", "mp4", "wav", "flac", "mov", "avi", "mkv", "webm",
    "pdf", "woff", "woff2", "ttf", "otf", "eot", "iso", "dmg",
];

/// Build and dependency directories, hidden only from search when enabled.
const BUILD_DIRECTORIES: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    ".cache",
    "__pycache__",
    ".venv",
    "venv",
    "vendor",
    "coverage",
    ".gradle",
];

#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    patterns: Gitignore,
    hidden_directories: Vec<String>,
}

impl IgnoreFilter {
    /// Junk, VCS metadata, lockfiles and binaries, plus build directories
    /// when `hide_build_dirs` is set.
    pub fn for_search(hide_build_dirs: bool) -> Self {
        let hidden = if hide_build_dirs {
            BUILD_DIRECTORIES.iter().map(|d| d.to_string()).collect()
        } else {
            Vec::new()
        };
        Self::with_patterns(DEFAULT_PATTERNS, hidden)
    }

    /// Build a filter from custom glob patterns and an exact-name directory denylist.
    pub fn with_patterns(patterns: &[&str], hidden_directories: Vec<String>) -> Self {
        let mut builder = GitignoreBuilder::new("/");
        for pattern in patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Skipping invalid ignore pattern {:?}: {}", pattern, e);
            }
        }
        let patterns = builder.build().unwrap_or_else(|e| {
            log::warn!("Failed to compile ignore patterns: {}", e);
            Gitignore::empty()
        });

        Self {
            patterns,
            hidden_directories,
        }
    }

    pub fn should_ignore(&self, name: &str, is_dir: bool) -> bool {
        if name.is_empty() {
            return false;
        }

        if self.patterns.matched(name, is_dir).is_ignore() {
            return true;
        }

        if is_dir {
            return self.hidden_directories.iter().any(|d| d == name);
        }

        match name.rsplit_once('.') {
            // A leading dot is a dotfile, not an extension
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                BINARY_EXTENSIONS.contains(&ext.as_str())
            }
            _ => false,
        }
    }

    /// Apply [`IgnoreFilter::should_ignore`] to the final component of `path`.
    pub fn should_ignore_path(&self, path: &Path, is_dir: bool) -> bool {
        path.file_name()
            .map(|name| self.should_ignore(&name.to_string_lossy(), is_dir))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_junk_is_ignored() {
        let filter = IgnoreFilter::for_search(false);
        assert!(filter.should_ignore(".DS_Store", false));
        assert!(filter.should_ignore("Thumbs.db", false));
        assert!(filter.should_ignore("._resource", false));
        assert!(filter.should_ignore("notes.txt.swp", false));
    }

    #[test]
    fn test_vcs_directories_are_ignored() {
        let filter = IgnoreFilter::for_search(false);
        assert!(filter.should_ignore(".git", true));
        assert!(filter.should_ignore(".svn", true));
        assert!(filter.should_ignore(".hg", true));
    }

    #[test]
    fn test_other_dotfiles_stay_visible() {
        let filter = IgnoreFilter::for_search(false);
        assert!(!filter.should_ignore(".env", false));
        assert!(!filter.should_ignore(".gitignore", false));
        assert!(!filter.should_ignore(".github", true));
        assert!(!filter.should_ignore(".eslintrc.json", false));
    }

    #[test]
    fn test_lockfiles_are_ignored() {
        let filter = IgnoreFilter::for_search(false);
        assert!(filter.should_ignore("package-lock.json", false));
        assert!(filter.should_ignore("Cargo.lock", false));
        assert!(!filter.should_ignore("Cargo.toml", false));
    }

    #[test]
    fn test_binary_extensions_only_apply_to_files() {
        let filter = IgnoreFilter::for_search(false);
        assert!(filter.should_ignore("logo.PNG", false));
        assert!(filter.should_ignore("archive.tar", false));
        assert!(filter.should_ignore("app.exe", false));
        assert!(!filter.should_ignore("assets.zip", true));
        assert!(!filter.should_ignore("main.rs", false));
    }

    #[test]
    fn test_build_directories_only_hidden_by_search_filter() {
        let search = IgnoreFilter::for_search(true);
        let search_all = IgnoreFilter::for_search(false);

        assert!(search.should_ignore("node_modules", true));
        assert!(search.should_ignore("target", true));
        assert!(!search_all.should_ignore("node_modules", true));

        // A file that happens to share the name is not a build directory
        assert!(!search.should_ignore("build", false));
    }

    #[test]
    fn test_should_ignore_path_uses_file_name() {
        let filter = IgnoreFilter::for_search(true);
        assert!(filter.should_ignore_path(Path::new("/p/web/node_modules"), true));
        assert!(filter.should_ignore_path(Path::new("/p/.DS_Store"), false));
        assert!(!filter.should_ignore_path(Path::new("/p/node_modules/readme.md"), false));
        assert!(!filter.should_ignore_path(Path::new("/"), true));
    }
}
