//! In-memory project file tree kept in sync with the disk, the file watcher
//! and git, plus a cached flat file list for fuzzy search.

pub mod buffers;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod fuzzy;
pub mod git_status;
pub mod ignore_filter;
pub mod recent;
pub mod reconcile;
pub mod search;
pub mod session;
pub mod store;
pub mod tree;
pub mod watcher;

pub use error::{ProjectTreeError, Result};
pub use session::{ProjectSession, Workspace};
