//! Reconciles watcher events with open buffers.
//!
//! Watcher events never change the tree shape. A `created`/`modified` event
//! reloads the matching open buffer unless the editor itself just wrote the
//! path, in which case the event is treated as an echo and dropped.

use crate::buffers::{BufferId, BufferLayer};
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::watcher::{FileChangeEvent, FileChangeKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// Paths the editor is about to write, each with a self-expiring window.
#[derive(Debug)]
pub struct PendingSaves {
    entries: HashMap<PathBuf, Instant>,
    window: Duration,
}

impl PendingSaves {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn mark(&mut self, path: &Path) {
        self.entries.insert(path.to_path_buf(), Instant::now());
    }

    pub fn clear(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    /// True while the entry for `path` is younger than the window.
    pub fn is_pending(&self, path: &Path) -> bool {
        self.entries
            .get(path)
            .map(|marked| marked.elapsed() < self.window)
            .unwrap_or(false)
    }

    pub fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries.retain(|_, marked| marked.elapsed() < window);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What the reconciler did with one watcher event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Deletions are handled through the explicit delete path.
    Ignored,
    /// Echo of the editor's own write.
    Suppressed,
    Reloaded(BufferId),
    NoBuffer,
}

#[derive(Debug)]
pub struct WatchReconciler {
    pending: PendingSaves,
}

impl WatchReconciler {
    pub fn new(pending_window: Duration) -> Self {
        Self {
            pending: PendingSaves::new(pending_window),
        }
    }

    pub fn pending_saves(&self) -> &PendingSaves {
        &self.pending
    }

    pub fn pending_saves_mut(&mut self) -> &mut PendingSaves {
        &mut self.pending
    }

    pub async fn handle_event<B>(
        &mut self,
        event: &FileChangeEvent,
        buffers: &mut B,
        bus: &EventBus,
    ) -> Result<ReconcileOutcome>
    where
        B: BufferLayer + ?Sized,
    {
        self.pending.prune_expired();

        if event.kind == FileChangeKind::Deleted {
            return Ok(ReconcileOutcome::Ignored);
        }

        // Leave the entry in place: the watcher may report the same write twice
        if self.pending.is_pending(&event.path) {
            log::debug!("Suppressing echo of our own write to {:?}", event.path);
            return Ok(ReconcileOutcome::Suppressed);
        }

        let Some(id) = buffers.buffer_for_path(&event.path) else {
            return Ok(ReconcileOutcome::NoBuffer);
        };

        buffers.reload_buffer_from_disk(id).await?;
        log::info!("Reloaded {:?} after external change", event.path);
        bus.publish(EngineEvent::FileReloaded {
            path: event.path.clone(),
        });
        Ok(ReconcileOutcome::Reloaded(id))
    }
}
