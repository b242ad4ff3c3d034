//! Per-path coalescing of rapid events on the worker.
//!
//! The first event for a path goes straight through. Events arriving within the
//! debounce interval after it are parked, the latest replacing earlier ones, and
//! replayed once the interval has elapsed. A burst of N events therefore costs at
//! most two conversions.

use crate::events::SyncEvent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Parked {
    event: SyncEvent,
    due: Instant,
}

pub struct Debouncer {
    interval: Duration,
    last_processed: HashMap<PathBuf, Instant>,
    parked: HashMap<PathBuf, Parked>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_processed: HashMap::new(),
            parked: HashMap::new(),
        }
    }

    /// Decide whether `event` runs now. Returns it back if so; parks it otherwise.
    ///
    /// Deletions always run immediately and discard anything parked for the path.
    pub fn admit(&mut self, event: SyncEvent, now: Instant) -> Option<SyncEvent> {
        self.prune(now);
        if event.kind.is_delete() {
            self.parked.remove(&event.path);
            return Some(event);
        }

        if let Some(last) = self.last_processed.get(&event.path) {
            let due = *last + self.interval;
            if now < due {
                debug!("Debouncing {}", event);
                self.parked.insert(event.path.clone(), Parked { event, due });
                return None;
            }
        }

        self.parked.remove(&event.path);
        Some(event)
    }

    /// Remember when `path` was last handled.
    pub fn mark_processed(&mut self, path: &Path, now: Instant) {
        self.last_processed.insert(path.to_path_buf(), now);
    }

    /// Parked events whose interval has elapsed, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<SyncEvent> {
        self.prune(now);
        let due_paths: Vec<PathBuf> = self
            .parked
            .iter()
            .filter(|(_, parked)| parked.due <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut due: Vec<Parked> = due_paths
            .iter()
            .filter_map(|path| self.parked.remove(path))
            .collect();
        due.sort_by_key(|parked| parked.due);
        due.into_iter().map(|parked| parked.event).collect()
    }

    /// Drop timestamps that can no longer hold an event back.
    fn prune(&mut self, now: Instant) {
        let interval = self.interval;
        self.last_processed
            .retain(|_, last| now.saturating_duration_since(*last) < interval);
    }

    /// When the worker next has to wake up for a parked event.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.parked.values().map(|parked| parked.due).min()
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }
}
