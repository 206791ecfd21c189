//! Command implementations behind the CLI, kept here so they can be tested
//! against any writer.

use crate::buffers::BufferLayer;
use crate::config::Config;
use crate::error::Result;
use crate::git_status::{GitFileStatus, GitStatusProvider};
use crate::recent::RecentFiles;
use crate::search::SearchHit;
use crate::session::ProjectSession;
use crate::watcher::{FileChangeKind, FileWatcher};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Print every visible node, indented by depth, with an optional git label.
pub fn render_tree(
    session: &ProjectSession,
    statuses: &HashMap<PathBuf, GitFileStatus>,
    out: &mut dyn Write,
) -> Result<()> {
    writeln!(out, "{}", session.root().display())?;
    for (node, depth) in session.tree().visible_entries() {
        let marker = if node.is_dir {
            if node.expanded {
                "v "
            } else {
                "> "
            }
        } else {
            "  "
        };
        let label = statuses
            .get(&node.path)
            .map(|status| format!(" [{}]", status.status.label()))
            .unwrap_or_default();
        let suffix = if node.is_dir { "/" } else { "" };
        writeln!(
            out,
            "{}{}{}{}{}",
            "  ".repeat(depth + 1),
            marker,
            node.name,
            suffix,
            label
        )?;
    }
    Ok(())
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

pub async fn run_tree(session: &mut ProjectSession, expand: &[PathBuf], out: &mut dyn Write) -> Result<()> {
    for path in expand {
        let path = resolve(session.root(), path);
        session.reveal(&path).await?;
        session.expand(&path).await?;
    }
    render_tree(session, &HashMap::new(), out)
}

fn write_bucket(out: &mut dyn Write, title: &str, hits: &[SearchHit]) -> Result<()> {
    if hits.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}:", title)?;
    for hit in hits {
        writeln!(out, "  {:>7.1}  {}", hit.score, hit.relative_path)?;
    }
    Ok(())
}

pub async fn run_search<B>(
    session: &mut ProjectSession,
    query: &str,
    buffers: &B,
    recent: &RecentFiles,
    out: &mut dyn Write,
) -> Result<usize>
where
    B: BufferLayer + ?Sized,
{
    let results = session.search(query, buffers, recent).await?;
    write_bucket(out, "Open", &results.open)?;
    write_bucket(out, "Recent", &results.recent)?;
    write_bucket(out, "Files", &results.other)?;
    if results.is_empty() {
        writeln!(out, "No matches for {:?}", query)?;
    }
    Ok(results.len())
}

/// Refresh git status, reveal every changed path and print the annotated tree.
pub async fn run_status(
    session: &mut ProjectSession,
    provider: &dyn GitStatusProvider,
    out: &mut dyn Write,
) -> Result<usize> {
    let count = session.refresh_git_status(provider).await?;
    let changed: Vec<PathBuf> = session
        .git()
        .statuses()
        .iter()
        .map(|status| session.root().join(&status.path))
        .collect();
    for path in &changed {
        // Deleted files no longer exist on disk, so their parents may be gone too
        if let Err(e) = session.reveal(path).await {
            log::debug!("Cannot reveal {:?}: {}", path, e);
        }
    }

    let annotations = session.git_annotations();
    render_tree(session, &annotations, out)?;
    writeln!(out, "{} changed paths", count)?;
    Ok(count)
}

/// Print reconciled change events until `shutdown` is cancelled.
pub async fn run_watch<B>(
    session: &mut ProjectSession,
    watcher: Box<dyn FileWatcher>,
    buffers: &mut B,
    shutdown: CancellationToken,
    out: &mut dyn Write,
) -> Result<usize>
where
    B: BufferLayer + ?Sized,
{
    let mut events = session.start_watching(watcher)?;
    writeln!(out, "Watching {} (Ctrl-C to stop)", session.root().display())?;
    out.flush()?;

    let mut seen = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                seen += 1;
                let outcome = session.handle_watch_event(&event, buffers).await?;
                let kind = match event.kind {
                    FileChangeKind::Created => "created",
                    FileChangeKind::Modified => "modified",
                    FileChangeKind::Deleted => "deleted",
                };
                writeln!(out, "{:<8} {} ({:?})", kind, event.path.display(), outcome)?;
                out.flush()?;
            }
        }
    }

    session.stop_watching();
    Ok(seen)
}

pub fn dump_config(config: &Config, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
    Ok(())
}
