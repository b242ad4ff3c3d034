//! The sync engine: an event queue drained by a single worker task.
//!
//! Producers (the OS watcher, the initial scan) push [`SyncEvent`]s through an
//! unbounded channel. The worker debounces them per path and hands each one to the
//! [`EventProcessor`], which performs the remote calls and state updates. A failed
//! event is logged and the worker moves on.

mod debounce;
mod processor;
mod scan;

pub use debounce::Debouncer;
pub use processor::EventProcessor;
pub use scan::{walk, Tree};

use crate::conflict::{ConflictError, ResolutionStrategy};
use crate::events::{EventSender, SyncEvent};
use crate::remote::{RemoteError, WikiClient};
use crate::state::{StateError, SyncState};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine is stopped")]
    Stopped,
}

/// Settings the engine is constructed with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the mirrored tree
    pub docs_dir: PathBuf,
    /// Minimum time between two runs for the same path
    pub debounce: Duration,
    /// Default policy for title conflicts
    pub conflict_strategy: ResolutionStrategy,
}

impl EngineConfig {
    pub fn new(docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            debounce: Duration::from_secs(2),
            conflict_strategy: ResolutionStrategy::default(),
        }
    }
}

pub struct SyncEngine<C: WikiClient + 'static> {
    processor: Arc<EventProcessor<C>>,
    tx: EventSender,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl<C: WikiClient + 'static> SyncEngine<C> {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn start(config: EngineConfig, state: SyncState, client: Arc<C>) -> Self {
        let processor = Arc::new(EventProcessor::new(
            &config.docs_dir,
            state,
            client,
            config.conflict_strategy,
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            processor.clone(),
            rx,
            shutdown_rx,
            config.debounce,
        ));
        info!(
            "Sync engine started for {} (debounce {:?})",
            processor.docs_dir().display(),
            config.debounce
        );

        Self {
            processor,
            tx,
            shutdown,
            worker,
        }
    }

    /// A sender for producers such as the file watcher.
    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    pub fn enqueue(&self, event: SyncEvent) -> Result<(), SyncError> {
        debug!("Enqueuing event: {}", event);
        self.tx.send(event).map_err(|_| SyncError::Stopped)
    }

    /// Queue folder and file creations for everything not yet tracked.
    ///
    /// Returns the number of events queued.
    pub async fn initial_scan(&self) -> Result<usize, SyncError> {
        let events = self.processor.initial_scan_events().await;
        let count = events.len();
        for event in events {
            self.enqueue(event)?;
        }
        info!("Initial scan queued {} events", count);
        Ok(count)
    }

    /// Untracked local titles that already exist remotely (title → page id).
    pub async fn scan_for_conflicts(&self) -> Result<HashMap<String, String>, SyncError> {
        self.processor.scan_for_conflicts().await
    }

    /// Conflict kind label → count.
    pub fn conflict_summary(&self) -> BTreeMap<String, usize> {
        self.processor.conflict_summary()
    }

    pub async fn tracked_paths(&self) -> BTreeSet<String> {
        self.processor.tracked_paths().await
    }

    pub fn processor(&self) -> &Arc<EventProcessor<C>> {
        &self.processor
    }

    /// Signal the worker and wait for it to finish its current event.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.worker.await {
            error!("Sync worker ended abnormally: {}", e);
        }
        info!("Sync engine stopped");
    }
}

async fn run_worker<C: WikiClient + 'static>(
    processor: Arc<EventProcessor<C>>,
    mut rx: mpsc::UnboundedReceiver<SyncEvent>,
    mut shutdown: watch::Receiver<bool>,
    debounce: Duration,
) {
    let mut debouncer = Debouncer::new(debounce);

    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                debug!("Sync worker received shutdown");
                break;
            }

            received = rx.recv() => {
                let Some(event) = received else {
                    debug!("Event queue closed");
                    break;
                };
                if let Some(event) = debouncer.admit(event, Instant::now()) {
                    handle(&processor, &mut debouncer, event).await;
                }
            }

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for event in debouncer.take_due(Instant::now()) {
                    handle(&processor, &mut debouncer, event).await;
                }
            }
        }
    }

    if debouncer.parked_len() > 0 {
        warn!("Dropping {} debounced events on shutdown", debouncer.parked_len());
    }
}

async fn handle<C: WikiClient>(
    processor: &EventProcessor<C>,
    debouncer: &mut Debouncer,
    event: SyncEvent,
) {
    match processor.process_event(&event).await {
        Ok(()) => {}
        Err(SyncError::Conflict(e)) => error!("Aborted {}: {}", event, e),
        Err(e) => error!("Failed to process {}: {}", event, e),
    }
    debouncer.mark_processed(&event.path, Instant::now());
}
