//! Turns one [`SyncEvent`] into the remote calls and state updates that realize it.

use super::{scan, SyncError};
use crate::conflict::{ConflictDetector, ResolutionStrategy};
use crate::events::{SyncEvent, SyncEventKind};
use crate::markup::{templates, MarkupConverter, UploadResults};
use crate::paths;
use crate::remote::{RemoteError, WikiClient};
use crate::state::{unix_time, SyncState};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Suffixed titles checked per round when conflicts are renamed.
const SUFFIX_WINDOW: u32 = 9;
/// Rounds of suffix checks before settling on an unchecked title.
const MAX_SUFFIX_ROUNDS: u32 = 10;

/// Where a new page should go after conflict handling.
enum Target {
    /// Create a page with this title
    Create(String),
    /// Reuse the existing page with this id
    Existing(String),
}

pub struct EventProcessor<C: WikiClient> {
    docs_dir: PathBuf,
    state: RwLock<SyncState>,
    client: Arc<C>,
    converter: MarkupConverter,
    conflicts: Mutex<ConflictDetector>,
}

impl<C: WikiClient> EventProcessor<C> {
    pub fn new(
        docs_dir: &Path,
        state: SyncState,
        client: Arc<C>,
        strategy: ResolutionStrategy,
    ) -> Self {
        Self {
            docs_dir: paths::normalize(docs_dir),
            state: RwLock::new(state),
            client,
            converter: MarkupConverter::new(),
            conflicts: Mutex::new(ConflictDetector::new(strategy)),
        }
    }

    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn detector(&self) -> std::sync::MutexGuard<'_, ConflictDetector> {
        self.conflicts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Realize a single event remotely.
    pub async fn process_event(&self, event: &SyncEvent) -> Result<(), SyncError> {
        info!("Processing event: {}", event);
        let path = paths::normalize(&event.path);
        match event.kind {
            SyncEventKind::Created | SyncEventKind::Modified => self.sync_file(&path).await,
            SyncEventKind::Deleted => self.delete_path(&path).await,
            SyncEventKind::FolderCreated => self.create_folder(&path).await,
            SyncEventKind::FolderDeleted => self.delete_folder(&path).await,
        }
    }

    // ==================== Documents ====================

    async fn sync_file(&self, path: &Path) -> Result<(), SyncError> {
        if !path.is_file() {
            warn!("File not found, dropping stale event: {}", path.display());
            return Ok(());
        }

        let (markup, images) =
            self.converter
                .convert_file(path)
                .map_err(|source| SyncError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        let key = paths::key(path);
        let title = paths::page_title(path);
        let parent_id = self.resolve_parent(path, &title).await;

        let tracked = self.state.read().await.get_page_id(&key).map(str::to_string);
        let (page_id, title) = match tracked {
            Some(page_id) => match self.client.get_page(&page_id).await {
                Ok(current) => {
                    self.client.update_page(&page_id, &current.title, &markup).await?;
                    info!("Updated page {} for {}", page_id, path.display());
                    (page_id, current.title)
                }
                Err(RemoteError::NotFound(_)) => {
                    warn!(
                        "Page {} for {} is gone remotely, recreating",
                        page_id,
                        path.display()
                    );
                    self.state.write().await.remove_mapping(&key)?;
                    match self.place_new_page(path, &title, &markup, parent_id).await? {
                        Some(placed) => placed,
                        None => return Ok(()),
                    }
                }
                Err(e) => return Err(e.into()),
            },
            None => match self.place_new_page(path, &title, &markup, parent_id).await? {
                Some(placed) => placed,
                None => return Ok(()),
            },
        };

        if !images.is_empty() {
            let mut uploads = UploadResults::new();
            for image in &images {
                let uploaded = self
                    .client
                    .upload_attachment(&page_id, &image.source_path)
                    .await
                    .is_some();
                if !uploaded {
                    warn!("Failed to upload {} for {}", image.filename, path.display());
                }
                uploads.insert(image.filename.clone(), uploaded);
            }
            let finished = self.converter.finalize(&markup, &images, &uploads);
            self.client.update_page(&page_id, &title, &finished).await?;
            debug!("Finalized {} images on page {}", images.len(), page_id);
        }

        self.state.write().await.update_sync_time(&key, unix_time())?;
        Ok(())
    }

    /// Create (or adopt, under `Overwrite`) the page for an untracked document and
    /// record the mapping. `None` means the conflict policy skipped it.
    async fn place_new_page(
        &self,
        path: &Path,
        title: &str,
        markup: &str,
        parent_id: Option<String>,
    ) -> Result<Option<(String, String)>, SyncError> {
        let key = paths::key(path);
        let placed = match self.resolve_target(path, title).await? {
            None => return Ok(None),
            Some(Target::Existing(page_id)) => {
                let page = self.client.update_page(&page_id, title, markup).await?;
                info!("Overwrote page {} with {}", page.id, path.display());
                (page.id, page.title)
            }
            Some(Target::Create(resolved)) => {
                let page = self
                    .client
                    .create_page(&resolved, markup, parent_id.as_deref())
                    .await?;
                info!("Created page {} '{}' for {}", page.id, page.title, path.display());
                (page.id, page.title)
            }
        };

        self.state
            .write()
            .await
            .add_mapping(&key, &placed.0, unix_time())?;
        Ok(Some(placed))
    }

    async fn delete_path(&self, path: &Path) -> Result<(), SyncError> {
        let key = paths::key(path);
        let tracked = self.state.read().await.get_page_id(&key).map(str::to_string);
        let Some(page_id) = tracked else {
            info!("No page mapped to {}, nothing to delete", path.display());
            return Ok(());
        };

        match self.client.delete_page(&page_id).await {
            Ok(()) => info!("Deleted page {} for {}", page_id, path.display()),
            Err(RemoteError::NotFound(_)) => {
                info!("Page {} for {} was already gone", page_id, path.display())
            }
            Err(e) => return Err(e.into()),
        }
        self.state.write().await.remove_mapping(&key)?;
        self.detector().forget_path(path);
        Ok(())
    }

    // ==================== Folders ====================

    /// Map the folder and everything untracked below it.
    ///
    /// A directory moved into the tree arrives as a single event, so its
    /// contents are synced here, shallowest directories first.
    async fn create_folder(&self, path: &Path) -> Result<(), SyncError> {
        if !path.is_dir() {
            warn!("Directory not found, dropping stale event: {}", path.display());
            return Ok(());
        }
        if self.state.read().await.get_page_id(&paths::key(path)).is_some() {
            debug!("Folder {} already has a page", path.display());
            return Ok(());
        }
        self.create_folder_page(path).await?;

        let tree = scan::walk(path);
        let pending = {
            let state = self.state.read().await;
            scan::untracked_events(&tree, &state)
        };
        if !pending.is_empty() {
            info!(
                "Syncing {} untracked entries below {}",
                pending.len(),
                path.display()
            );
        }
        for event in &pending {
            let result = match event.kind {
                SyncEventKind::FolderCreated => self.create_folder_page(&event.path).await,
                _ => self.sync_file(&event.path).await,
            };
            if let Err(e) = result {
                warn!("Failed to sync {}: {}", event.path.display(), e);
            }
        }
        Ok(())
    }

    async fn create_folder_page(&self, path: &Path) -> Result<(), SyncError> {
        let key = paths::key(path);
        if self.state.read().await.get_page_id(&key).is_some() {
            debug!("Folder {} already has a page", path.display());
            return Ok(());
        }

        let title = paths::page_title(path);
        let parent_id = self.resolve_parent(path, &title).await;
        let body = templates::folder_landing_page(&title);
        if let Some((page_id, _)) = self.place_new_page(path, &title, &body, parent_id).await? {
            info!("Folder {} mapped to page {}", path.display(), page_id);
        }
        Ok(())
    }

    /// Delete every tracked page below `path`, deepest first, then the folder's own.
    async fn delete_folder(&self, path: &Path) -> Result<(), SyncError> {
        let mut descendants = self.state.read().await.tracked_descendants(path);
        descendants.sort_by(|a, b| {
            paths::depth(b)
                .cmp(&paths::depth(a))
                .then_with(|| b.cmp(a))
        });
        info!(
            "Deleting folder {} with {} tracked descendants",
            path.display(),
            descendants.len()
        );

        for descendant in &descendants {
            if let Err(e) = self.delete_path(descendant).await {
                warn!("Failed to delete {}: {}", descendant.display(), e);
            }
        }
        self.delete_path(path).await
    }

    // ==================== Hierarchy and conflicts ====================

    /// Page id of the directory containing `path`. Top-level entries have none.
    async fn resolve_parent(&self, path: &Path, title: &str) -> Option<String> {
        let Ok(relative) = path.strip_prefix(&self.docs_dir) else {
            warn!("{} is outside {}", path.display(), self.docs_dir.display());
            return None;
        };
        let nested = relative
            .parent()
            .map(|p| !p.as_os_str().is_empty())
            .unwrap_or(false);
        if !nested {
            return None;
        }

        let parent_dir = path.parent()?;
        let parent_id = self
            .state
            .read()
            .await
            .get_page_id(&paths::key(parent_dir))
            .map(str::to_string);
        if parent_id.is_none() {
            warn!(
                "No page for parent directory {}, placing {} at top level",
                parent_dir.display(),
                path.display()
            );
            self.detector().record_hierarchy_conflict(path, title);
        }
        parent_id
    }

    /// Check `title` against the space and apply the conflict strategy.
    ///
    /// When renaming, suffixes are checked a window at a time until one is free,
    /// so the chosen title has always been looked up remotely.
    async fn resolve_target(&self, path: &Path, title: &str) -> Result<Option<Target>, SyncError> {
        let strategy = self.detector().default_strategy();
        let renames = matches!(
            strategy,
            ResolutionStrategy::AppendSuffix | ResolutionStrategy::Interactive
        );
        let mut checked = vec![title.to_string()];
        if renames {
            checked.extend(suffixed(title, 2));
        }

        let mut existing: HashMap<String, String> =
            match self.client.check_title_conflicts(&checked).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!("Conflict check failed for '{}', proceeding: {}", title, e);
                    return Ok(Some(Target::Create(title.to_string())));
                }
            };
        if !existing.contains_key(title) {
            return Ok(Some(Target::Create(title.to_string())));
        }

        if renames {
            let mut rounds = 1;
            while checked.iter().all(|t| existing.contains_key(t)) {
                if rounds == MAX_SUFFIX_ROUNDS {
                    warn!("Every checked suffix of '{}' is taken", title);
                    break;
                }
                let window = suffixed(title, 2 + rounds * SUFFIX_WINDOW);
                match self.client.check_title_conflicts(&window).await {
                    Ok(taken) => existing.extend(taken),
                    Err(e) => {
                        warn!("Conflict check failed for '{}': {}", title, e);
                        break;
                    }
                }
                checked.extend(window);
                rounds += 1;
            }
        }

        let proposed = BTreeMap::from([(path.to_path_buf(), title.to_string())]);
        let resolved = {
            let mut detector = self.detector();
            let conflicts = detector.detect_title_conflicts(&proposed, &existing);
            detector.resolve(conflicts, None)?
        };

        let Some(conflict) = resolved.into_iter().next() else {
            return Ok(Some(Target::Create(title.to_string())));
        };
        match (conflict.resolution, conflict.resolved_title) {
            (Some(ResolutionStrategy::Overwrite), Some(_)) => {
                let Some(page_id) = conflict.existing_page_id else {
                    return Ok(None);
                };
                if self.state.read().await.is_tombstoned(&page_id) {
                    warn!(
                        "Page {} was deleted by an earlier sync, not overwriting it with {}",
                        page_id,
                        path.display()
                    );
                    return Ok(None);
                }
                Ok(Some(Target::Existing(page_id)))
            }
            (_, Some(resolved)) => Ok(Some(Target::Create(resolved))),
            (_, None) => {
                info!("Skipping {}: title '{}' is taken", path.display(), title);
                Ok(None)
            }
        }
    }

    // ==================== Read-only surface ====================

    pub fn conflict_summary(&self) -> BTreeMap<String, usize> {
        self.detector().summary()
    }

    pub fn has_unresolved_conflicts(&self) -> bool {
        self.detector().has_unresolved_conflicts()
    }

    pub async fn tracked_paths(&self) -> BTreeSet<String> {
        self.state.read().await.tracked_paths()
    }

    pub async fn page_id_for(&self, path: &Path) -> Option<String> {
        self.state
            .read()
            .await
            .get_page_id(&paths::key(&paths::normalize(path)))
            .map(str::to_string)
    }

    /// Events that bring untracked directories and documents into the space.
    pub async fn initial_scan_events(&self) -> Vec<SyncEvent> {
        let tree = scan::walk(&self.docs_dir);
        let state = self.state.read().await;
        scan::untracked_events(&tree, &state)
    }

    /// Titles of untracked entries that already exist remotely (title → page id).
    pub async fn scan_for_conflicts(&self) -> Result<HashMap<String, String>, SyncError> {
        let tree = scan::walk(&self.docs_dir);
        let titles: Vec<String> = {
            let state = self.state.read().await;
            tree.dirs
                .iter()
                .chain(tree.files.iter())
                .filter(|p| state.get_page_id(&paths::key(p)).is_none())
                .map(|p| paths::page_title(p))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        if titles.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self.client.check_title_conflicts(&titles).await?)
    }
}

/// `title (n)` for the suffix window starting at `from`.
fn suffixed(title: &str, from: u32) -> Vec<String> {
    (from..from + SUFFIX_WINDOW)
        .map(|n| format!("{title} ({n})"))
        .collect()
}
