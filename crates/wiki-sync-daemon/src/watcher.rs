//! OS file watcher feeding the sync engine.
//!
//! Raw notify events are turned into [`SyncEvent`]s by [`EventFilter`]: only
//! markdown files and non-hidden directories under the root pass, renames become
//! a delete plus a create, and creations and modifications of the same path are
//! dropped when they arrive within the debounce window. Deletions always pass.

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use wiki_sync_core::{paths, EventSender, SyncEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Maps raw notify events onto sync events for one root.
pub struct EventFilter {
    root: PathBuf,
    debounce: Duration,
    last_seen: HashMap<PathBuf, Instant>,
}

impl EventFilter {
    /// `root` should already be canonical.
    pub fn new(root: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            root: root.into(),
            debounce,
            last_seen: HashMap::new(),
        }
    }

    pub fn normalize(&mut self, event: &Event, now: Instant) -> Vec<SyncEvent> {
        let mut out = Vec::new();

        match event.kind {
            EventKind::Create(kind) => {
                for path in &event.paths {
                    let is_dir = match kind {
                        CreateKind::Folder => true,
                        CreateKind::File => false,
                        _ => path.is_dir(),
                    };
                    self.push_created(&mut out, path, is_dir, now);
                }
            }

            EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
                (RenameMode::Both, [from, to]) => {
                    let is_dir = if to.exists() { to.is_dir() } else { was_dir(from) };
                    self.push_removed(&mut out, from, is_dir);
                    self.push_created(&mut out, to, to.is_dir(), now);
                }
                (RenameMode::From, [from]) => {
                    self.push_removed(&mut out, from, was_dir(from));
                }
                (RenameMode::To, [to]) => {
                    self.push_created(&mut out, to, to.is_dir(), now);
                }
                (_, others) => {
                    // Backends that cannot pair renames report each side alone
                    for path in others {
                        if path.exists() {
                            self.push_created(&mut out, path, path.is_dir(), now);
                        } else {
                            self.push_removed(&mut out, path, was_dir(path));
                        }
                    }
                }
            },

            EventKind::Modify(_) => {
                for path in &event.paths {
                    if path.is_file() && self.accepts_file(path) && self.admit(path, now) {
                        out.push(SyncEvent::modified(paths::normalize(path)));
                    }
                }
            }

            EventKind::Remove(kind) => {
                for path in &event.paths {
                    let is_dir = match kind {
                        RemoveKind::Folder => true,
                        RemoveKind::File => false,
                        _ => was_dir(path),
                    };
                    self.push_removed(&mut out, path, is_dir);
                }
            }

            _ => {}
        }

        out
    }

    fn push_created(&mut self, out: &mut Vec<SyncEvent>, path: &Path, is_dir: bool, now: Instant) {
        if is_dir {
            if self.accepts_dir(path) && self.admit(path, now) {
                out.push(SyncEvent::folder_created(paths::normalize(path)));
            }
        } else if self.accepts_file(path) && self.admit(path, now) {
            out.push(SyncEvent::created(paths::normalize(path)));
        }
    }

    fn push_removed(&mut self, out: &mut Vec<SyncEvent>, path: &Path, is_dir: bool) {
        self.last_seen.remove(path);
        if is_dir {
            if self.accepts_dir(path) {
                out.push(SyncEvent::folder_deleted(paths::normalize(path)));
            }
        } else if self.accepts_file(path) {
            out.push(SyncEvent::deleted(paths::normalize(path)));
        }
    }

    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        match path.strip_prefix(&self.root) {
            Ok(relative) if !relative.as_os_str().is_empty() => Some(relative),
            Ok(_) => None,
            Err(_) => {
                warn!("Ignoring event outside {}: {}", self.root.display(), path.display());
                None
            }
        }
    }

    fn accepts_dir(&self, path: &Path) -> bool {
        self.relative(path)
            .map(|relative| !paths::has_ignored_segment(relative))
            .unwrap_or(false)
    }

    fn accepts_file(&self, path: &Path) -> bool {
        paths::is_markdown(path)
            && self
                .relative(path)
                .map(|relative| !paths::has_ignored_segment(relative))
                .unwrap_or(false)
    }

    /// Whether enough time passed since the last admitted event for `path`.
    ///
    /// Entries older than the window no longer suppress anything and are dropped.
    fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let debounce = self.debounce;
        self.last_seen
            .retain(|_, last| now.saturating_duration_since(*last) < debounce);
        if let Some(last) = self.last_seen.get(path) {
            if now.saturating_duration_since(*last) < self.debounce {
                debug!("Debounced {}", path.display());
                return false;
            }
        }
        self.last_seen.insert(path.to_path_buf(), now);
        true
    }
}

/// Best guess for a path that no longer exists: directories carry no extension.
///
/// Anything else is classified as a file, which the markdown filter then drops
/// unless it is a document.
fn was_dir(path: &Path) -> bool {
    path.extension().is_none()
}

/// Recursive watch on a documents directory.
///
/// Normalized events are pushed into the engine's queue from a dedicated thread.
pub struct FileWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn start(root: &Path, debounce: Duration, sink: EventSender) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;

        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher =
            notify::recommended_watcher(raw_tx).context("Failed to create file watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let mut filter = EventFilter::new(root.clone(), debounce);
        let thread_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("wiki-sync-watcher".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    let event = match raw_rx.recv_timeout(POLL_INTERVAL) {
                        Ok(Ok(event)) => event,
                        Ok(Err(e)) => {
                            error!("Watch error: {}", e);
                            continue;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    };

                    for sync_event in filter.normalize(&event, Instant::now()) {
                        debug!("Watcher: {}", sync_event);
                        if sink.send(sync_event).is_err() {
                            debug!("Event queue closed, watcher thread exiting");
                            return;
                        }
                    }
                }
            })
            .context("Failed to spawn watcher thread")?;

        info!("Watching {}", root.display());
        Ok(Self {
            root,
            watcher: Some(watcher),
            stop,
            thread: Some(thread),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Dropping the watcher closes the raw channel
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Watcher thread panicked");
            }
            info!("Stopped watching {}", self.root.display());
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
