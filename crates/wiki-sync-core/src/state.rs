//! Persistence for the file ↔ page mapping.
//!
//! Stores which remote page mirrors which local path, when each path was last
//! synced, and which page ids were deleted. The whole record is rewritten on every
//! mutation so the file on disk is never more than one call behind memory.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error on state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// On-disk layout of the state file. All four fields are required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Local path → remote page id
    pub file_to_page: BTreeMap<String, String>,
    /// Remote page id → local path
    pub page_to_file: BTreeMap<String, String>,
    /// Local path → last sync time (seconds since Unix epoch)
    pub last_sync: BTreeMap<String, f64>,
    /// Page ids removed by earlier syncs
    pub deleted_pages: Vec<String>,
}

/// Current time in seconds since the Unix epoch, as stored in `last_sync`.
pub fn unix_time() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Durable mapping between local paths and remote page ids.
pub struct SyncState {
    /// Path to the state file.
    path: PathBuf,
    /// In-memory copy, authoritative between writes.
    record: StateRecord,
}

impl SyncState {
    /// Open the state file, creating its directory if needed.
    ///
    /// A missing or blank file yields an empty state. A file that cannot be decoded
    /// is copied to `<file>.corrupted.bak` and replaced by an empty state.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StateError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let record = Self::read_record(&path);
        Ok(Self { path, record })
    }

    fn read_record(path: &Path) -> StateRecord {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                return StateRecord::default();
            }
            Err(e) => {
                error!("Failed to read state file {}: {}", path.display(), e);
                Self::backup_corrupted(path);
                return StateRecord::default();
            }
        };

        if contents.trim().is_empty() {
            debug!("State file {} is empty, starting empty", path.display());
            return StateRecord::default();
        }

        match serde_json::from_str::<StateRecord>(&contents) {
            Ok(record) => {
                info!(
                    "Loaded sync state from {} ({} tracked paths)",
                    path.display(),
                    record.file_to_page.len()
                );
                record
            }
            Err(e) => {
                error!("State file {} is corrupted: {}", path.display(), e);
                Self::backup_corrupted(path);
                StateRecord::default()
            }
        }
    }

    /// Best-effort copy of an unreadable state file next to the original.
    fn backup_corrupted(path: &Path) {
        let backup = Self::backup_path(path);
        match fs::copy(path, &backup) {
            Ok(_) => warn!("Backed up corrupted state file to {}", backup.display()),
            Err(e) => warn!(
                "Could not back up corrupted state file {}: {}",
                path.display(),
                e
            ),
        }
    }

    /// `<state file>.corrupted.bak`
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".corrupted.bak");
        path.with_file_name(name)
    }

    /// Rewrite the whole state file (temp file + rename).
    fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.record)?;

        let mut tmp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, contents).map_err(|source| StateError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("Saved sync state to {}", self.path.display());
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remote page id for a local path.
    pub fn get_page_id(&self, path: &str) -> Option<&str> {
        self.record.file_to_page.get(path).map(String::as_str)
    }

    /// Local path for a remote page id.
    pub fn get_path(&self, page_id: &str) -> Option<&str> {
        self.record.page_to_file.get(page_id).map(String::as_str)
    }

    /// Record that `path` is mirrored by `page_id`.
    ///
    /// Any previous owner of `page_id` and any previous id of `path` are unlinked
    /// first, so both directions stay one-to-one.
    pub fn add_mapping(&mut self, path: &str, page_id: &str, sync_time: f64) -> Result<()> {
        if let Some(previous_id) = self.record.file_to_page.get(path).cloned() {
            if previous_id != page_id {
                self.record.page_to_file.remove(&previous_id);
            }
        }
        if let Some(previous_path) = self.record.page_to_file.get(page_id).cloned() {
            if previous_path != path {
                warn!(
                    "Page {} moved from {} to {}",
                    page_id, previous_path, path
                );
                self.record.file_to_page.remove(&previous_path);
                self.record.last_sync.remove(&previous_path);
            }
        }

        self.record
            .file_to_page
            .insert(path.to_string(), page_id.to_string());
        self.record
            .page_to_file
            .insert(page_id.to_string(), path.to_string());
        self.record.last_sync.insert(path.to_string(), sync_time);
        self.save()?;
        info!("Added mapping: {} -> {}", path, page_id);
        Ok(())
    }

    /// Forget `path`, tombstoning its page id. Returns the removed id.
    pub fn remove_mapping(&mut self, path: &str) -> Result<Option<String>> {
        let Some(page_id) = self.record.file_to_page.remove(path) else {
            return Ok(None);
        };

        self.record.page_to_file.remove(&page_id);
        self.record.last_sync.remove(path);
        if !self.record.deleted_pages.contains(&page_id) {
            self.record.deleted_pages.push(page_id.clone());
        }
        self.save()?;
        info!("Removed mapping: {} -> {}", path, page_id);
        Ok(Some(page_id))
    }

    pub fn get_last_sync_time(&self, path: &str) -> Option<f64> {
        self.record.last_sync.get(path).copied()
    }

    pub fn update_sync_time(&mut self, path: &str, sync_time: f64) -> Result<()> {
        self.record.last_sync.insert(path.to_string(), sync_time);
        self.save()?;
        debug!("Updated sync time for {}: {}", path, sync_time);
        Ok(())
    }

    /// Whether the page id was removed by an earlier sync.
    pub fn is_tombstoned(&self, page_id: &str) -> bool {
        self.record.deleted_pages.iter().any(|id| id == page_id)
    }

    pub fn tracked_paths(&self) -> BTreeSet<String> {
        self.record.file_to_page.keys().cloned().collect()
    }

    pub fn tracked_ids(&self) -> BTreeSet<String> {
        self.record.page_to_file.keys().cloned().collect()
    }

    /// Tracked paths strictly below `dir`.
    pub fn tracked_descendants(&self, dir: &Path) -> Vec<PathBuf> {
        self.record
            .file_to_page
            .keys()
            .map(PathBuf::from)
            .filter(|p| p != dir && p.starts_with(dir))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.record.file_to_page.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.file_to_page.is_empty()
    }

    pub fn clear_tombstones(&mut self) -> Result<()> {
        self.record.deleted_pages.clear();
        self.save()?;
        info!("Cleared deleted pages history");
        Ok(())
    }
}
