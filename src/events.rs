use std::path::PathBuf;
use tokio::sync::broadcast;

/// Notifications published by a project session for presentation-layer listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// An open buffer was reloaded after an external change.
    FileReloaded { path: PathBuf },
    /// A fresh git status list replaced the overlay.
    GitStatusUpdated,
    /// Memoized git lookups for these paths were dropped.
    GitCacheInvalidated { paths: Vec<PathBuf> },
    /// The tree shape changed at or below `path`.
    TreeChanged { path: PathBuf },
    /// The flat project file list must be rescanned.
    ProjectFilesInvalidated,
}

/// Broadcast fan-out of [`EngineEvent`]s. Sending never fails when nobody listens.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        log::trace!("Publishing {:?}", event);
        let _ = self.sender.send(event);
    }
}
