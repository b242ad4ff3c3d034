//! Change events flowing from the watcher (or the initial scan) into the engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Kind of filesystem change the engine has to realize remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    /// A markdown file appeared
    Created,
    /// A markdown file's content changed
    Modified,
    /// A markdown file disappeared
    Deleted,
    /// A directory appeared
    FolderCreated,
    /// A directory disappeared (together with everything below it)
    FolderDeleted,
}

impl SyncEventKind {
    /// Whether this event targets a directory rather than a document.
    pub fn is_folder(self) -> bool {
        matches!(self, SyncEventKind::FolderCreated | SyncEventKind::FolderDeleted)
    }

    /// Whether this event removes something.
    pub fn is_delete(self) -> bool {
        matches!(self, SyncEventKind::Deleted | SyncEventKind::FolderDeleted)
    }
}

/// A single normalized change, consumed once by the engine worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEvent {
    /// What happened.
    pub kind: SyncEventKind,
    /// Normalized absolute path of the affected file or directory.
    pub path: PathBuf,
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(kind: SyncEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(SyncEventKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(SyncEventKind::Modified, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(SyncEventKind::Deleted, path)
    }

    pub fn folder_created(path: impl Into<PathBuf>) -> Self {
        Self::new(SyncEventKind::FolderCreated, path)
    }

    pub fn folder_deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(SyncEventKind::FolderDeleted, path)
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<SyncEvent {:?} {}>", self.kind, self.path.display())
    }
}

/// Producer side of the engine's event queue.
pub type EventSender = mpsc::UnboundedSender<SyncEvent>;
