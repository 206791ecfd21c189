use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "project-tree")]
#[command(about = "Inspect a project's file tree, file search and git status")]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// JSON configuration file; defaults apply when it does not exist
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log at debug level to stderr
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Print the tree (default)
    Tree {
        /// Directories to expand before printing, relative to the root
        #[arg(short, long)]
        expand: Vec<PathBuf>,
    },
    /// Rank project files against a query
    Search {
        query: String,
        /// Recent-files JSON used for frecency ordering
        #[arg(long)]
        recent: Option<PathBuf>,
    },
    /// Print the tree annotated with git status
    Status,
    /// Stream debounced file change events until interrupted
    Watch,
    /// Print the effective configuration as JSON
    DumpConfig,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Tree { expand: Vec::new() }
    }
}
