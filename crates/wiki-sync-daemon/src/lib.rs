//! wiki-sync-daemon: native side of the markdown → Confluence mirror.
//!
//! Provides the pieces that touch the outside world:
//! - `config` - JSON configuration file with validation
//! - `confluence` - REST client implementing `WikiClient`
//! - `watcher` - OS file watcher producing `SyncEvent`s

pub mod config;
pub mod confluence;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use confluence::ConfluenceClient;
pub use watcher::{EventFilter, FileWatcher};
