use clap::Parser;
use project_tree::buffers::BufferRegistry;
use project_tree::cli::{Cli, Commands};
use project_tree::commands;
use project_tree::config::Config;
use project_tree::error::{ProjectTreeError, Result};
use project_tree::fs::LocalFileSystem;
use project_tree::git_status::GitCliStatusProvider;
use project_tree::recent::RecentFiles;
use project_tree::session::Workspace;
use project_tree::watcher::NotifyWatcher;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn init_logging(verbose: bool) -> Result<()> {
    // Log to a file only if PROJECT_TREE_LOG is set
    if let Ok(log_file) = std::env::var("PROJECT_TREE_LOG") {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| ProjectTreeError::io(&log_file, e))?;
        env_logger::Builder::new()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .filter_level(log::LevelFilter::Debug)
            .init();
        log::info!("project-tree starting up");
    } else if verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::load_or_default(path)?,
        None => Config::default(),
    };
    let root = std::fs::canonicalize(&cli.root).map_err(|e| ProjectTreeError::io(&cli.root, e))?;

    let fs = Arc::new(LocalFileSystem::new());
    let mut workspace = Workspace::new(config.clone(), fs.clone());
    let session = workspace.switch_project(root).await?;
    let mut buffers = BufferRegistry::new(fs);
    let mut stdout = io::stdout();

    match cli.command.unwrap_or_default() {
        Commands::Tree { expand } => commands::run_tree(session, &expand, &mut stdout).await,
        Commands::Search { query, recent } => {
            let recent = match recent {
                Some(path) => RecentFiles::load_or_default(&path, config.recent.clone())?,
                None => RecentFiles::new(config.recent.clone()),
            };
            commands::run_search(session, &query, &buffers, &recent, &mut stdout).await?;
            Ok(())
        }
        Commands::Status => {
            commands::run_status(session, &GitCliStatusProvider::new(), &mut stdout).await?;
            Ok(())
        }
        Commands::Watch => {
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal.cancel();
                }
            });
            let watcher = Box::new(NotifyWatcher::new(config.watcher.debounce()));
            let seen = commands::run_watch(session, watcher, &mut buffers, shutdown, &mut stdout).await?;
            log::info!("Watch finished after {} events", seen);
            Ok(())
        }
        Commands::DumpConfig => commands::dump_config(&config, &mut stdout),
    }
}
