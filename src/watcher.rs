//! File watcher bridge with per-path debouncing.
//!
//! Raw `notify` events are coalesced per path and flushed in batches so a
//! burst of writes (an editor save, a `git checkout`) arrives as one change.

use crate::error::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

impl FileChangeKind {
    /// Map a raw `notify` event kind; access and unknown events are dropped.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileChangeKind::Deleted),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileChangeKind::Created),
            EventKind::Modify(_) => Some(FileChangeKind::Modified),
            EventKind::Remove(_) => Some(FileChangeKind::Deleted),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Source of change events for one project root.
pub trait FileWatcher: Send {
    /// Start watching `root` recursively. Must be called inside a tokio runtime.
    fn watch(&mut self, root: &Path) -> Result<mpsc::UnboundedReceiver<FileChangeEvent>>;
    fn stop(&mut self);
}

/// Coalesces events per path until flushed.
///
/// - deleted then created becomes modified (the file was replaced)
/// - created then deleted stays deleted
/// - otherwise the latest kind wins
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: HashMap<PathBuf, FileChangeKind>,
    order: Vec<PathBuf>,
}

impl Debouncer {
    pub fn push(&mut self, event: FileChangeEvent) {
        match self.pending.get_mut(&event.path) {
            Some(existing) => {
                *existing = match (*existing, event.kind) {
                    (FileChangeKind::Deleted, FileChangeKind::Created) => FileChangeKind::Modified,
                    (FileChangeKind::Created, FileChangeKind::Modified) => FileChangeKind::Created,
                    (_, kind) => kind,
                };
            }
            None => {
                self.order.push(event.path.clone());
                self.pending.insert(event.path, event.kind);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take all coalesced events in first-seen order.
    pub fn drain(&mut self) -> Vec<FileChangeEvent> {
        let mut pending = std::mem::take(&mut self.pending);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|path| {
                pending
                    .remove(&path)
                    .map(|kind| FileChangeEvent { path, kind })
            })
            .collect()
    }
}

/// [`FileWatcher`] backed by the platform's native notification API.
pub struct NotifyWatcher {
    debounce: Duration,
    watcher: Option<RecommendedWatcher>,
    cancel: CancellationToken,
}

impl NotifyWatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            watcher: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }
}

impl FileWatcher for NotifyWatcher {
    fn watch(&mut self, root: &Path) -> Result<mpsc::UnboundedReceiver<FileChangeEvent>> {
        self.stop();
        self.cancel = CancellationToken::new();

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        log::info!("Watching {:?}", root);

        let cancel = self.cancel.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            let mut debouncer = Debouncer::default();
            let mut ticker = tokio::time::interval(debounce);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    raw = raw_rx.recv() => match raw {
                        Some(Ok(event)) => {
                            let Some(kind) = FileChangeKind::from_notify(&event.kind) else {
                                continue;
                            };
                            for path in event.paths {
                                debouncer.push(FileChangeEvent { path, kind });
                            }
                        }
                        Some(Err(e)) => log::error!("Watcher error: {}", e),
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if debouncer.is_empty() {
                            continue;
                        }
                        for event in debouncer.drain() {
                            if event_tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            log::debug!("Watcher loop stopped");
        });

        self.watcher = Some(watcher);
        Ok(event_rx)
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if self.watcher.take().is_some() {
            log::info!("Stopped file watcher");
        }
    }
}

impl Drop for NotifyWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            FileChangeKind::from_notify(&EventKind::Create(CreateKind::File)),
            Some(FileChangeKind::Created)
        );
        assert_eq!(
            FileChangeKind::from_notify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(FileChangeKind::Modified)
        );
        assert_eq!(
            FileChangeKind::from_notify(&EventKind::Remove(RemoveKind::File)),
            Some(FileChangeKind::Deleted)
        );
        assert_eq!(
            FileChangeKind::from_notify(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(FileChangeKind::Deleted)
        );
        assert_eq!(FileChangeKind::from_notify(&EventKind::Any), None);
    }

    #[test]
    fn test_debouncer_coalesces_per_path() {
        let mut debouncer = Debouncer::default();
        debouncer.push(FileChangeEvent::new("/p/a.ts", FileChangeKind::Modified));
        debouncer.push(FileChangeEvent::new("/p/b.ts", FileChangeKind::Deleted));
        debouncer.push(FileChangeEvent::new("/p/a.ts", FileChangeKind::Modified));
        debouncer.push(FileChangeEvent::new("/p/b.ts", FileChangeKind::Created));
        debouncer.push(FileChangeEvent::new("/p/c.ts", FileChangeKind::Created));
        debouncer.push(FileChangeEvent::new("/p/c.ts", FileChangeKind::Modified));

        let events = debouncer.drain();
        assert_eq!(
            events,
            vec![
                FileChangeEvent::new("/p/a.ts", FileChangeKind::Modified),
                FileChangeEvent::new("/p/b.ts", FileChangeKind::Modified),
                FileChangeEvent::new("/p/c.ts", FileChangeKind::Created),
            ]
        );
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_created_then_deleted_is_deleted() {
        let mut debouncer = Debouncer::default();
        debouncer.push(FileChangeEvent::new("/p/tmp", FileChangeKind::Created));
        debouncer.push(FileChangeEvent::new("/p/tmp", FileChangeKind::Deleted));
        assert_eq!(
            debouncer.drain(),
            vec![FileChangeEvent::new("/p/tmp", FileChangeKind::Deleted)]
        );
    }

    #[tokio::test]
    async fn test_notify_watcher_reports_writes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let mut watcher = NotifyWatcher::new(Duration::from_millis(50));
        let mut rx = watcher.watch(&root).unwrap();
        assert!(watcher.is_running());

        let file = root.join("watched.txt");
        std::fs::write(&file, "hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(event) if event.path.ends_with("watched.txt") => return Some(event),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .unwrap();
        assert!(event.is_some());

        watcher.stop();
        assert!(!watcher.is_running());
    }
}
