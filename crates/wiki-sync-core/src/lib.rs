//! wiki-sync-core: Mirrors a tree of markdown documents onto a wiki space.
//!
//! This crate provides the platform-neutral parts of the sync pipeline:
//! - Converting markdown into the wiki's storage markup (code blocks, images, macros)
//! - Persisting the file ↔ page mapping across restarts
//! - Detecting and resolving page title conflicts
//! - The `WikiClient` abstraction with its retry policy
//! - The event queue, debouncing worker and dispatch logic
//!
//! The OS file watcher and the HTTP client live in `wiki-sync-daemon`.

pub mod conflict;
pub mod engine;
pub mod events;
pub mod markup;
pub mod paths;
pub mod remote;
pub mod state;

pub use conflict::{ConflictDetector, ConflictError, ConflictInfo, ConflictKind, ResolutionStrategy};
pub use engine::{EngineConfig, EventProcessor, SyncEngine, SyncError};
pub use events::{EventSender, SyncEvent, SyncEventKind};
pub use markup::{LocalImage, MarkupConverter, UploadResults};
pub use remote::{Attachment, InMemoryWiki, Page, RemoteError, RetryPolicy, WikiCall, WikiClient};
pub use state::{StateError, SyncState};
