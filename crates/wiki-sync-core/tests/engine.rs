//! Engine tests against the in-memory wiki.
//!
//! Dispatch is exercised through `EventProcessor` directly; the worker loop
//! (debouncing, initial scan, shutdown) through `SyncEngine`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiki_sync_core::{
    EngineConfig, EventProcessor, InMemoryWiki, ResolutionStrategy, SyncEngine, SyncError,
    SyncEvent, SyncState, WikiCall, WikiClient,
};

struct Fixture {
    _temp: TempDir,
    docs: PathBuf,
    state_file: PathBuf,
    wiki: Arc<InMemoryWiki>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        let docs = docs.canonicalize().unwrap();
        let state_file = temp.path().join("state/state.json");
        Self {
            _temp: temp,
            docs,
            state_file,
            wiki: Arc::new(InMemoryWiki::new()),
        }
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.docs.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.docs.join(relative);
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn state(&self) -> SyncState {
        SyncState::load(&self.state_file).unwrap()
    }

    fn processor(&self, strategy: ResolutionStrategy) -> EventProcessor<InMemoryWiki> {
        EventProcessor::new(&self.docs, self.state(), self.wiki.clone(), strategy)
    }

    fn engine(&self, debounce: Duration) -> SyncEngine<InMemoryWiki> {
        let mut config = EngineConfig::new(&self.docs);
        config.debounce = debounce;
        SyncEngine::start(config, self.state(), self.wiki.clone())
    }

    fn count(&self, matches: impl Fn(&WikiCall) -> bool) -> usize {
        self.wiki.calls().iter().filter(|c| matches(c)).count()
    }

    fn creates(&self) -> usize {
        self.count(|c| matches!(c, WikiCall::CreatePage { .. }))
    }

    fn updates(&self) -> usize {
        self.count(|c| matches!(c, WikiCall::UpdatePage { .. }))
    }
}

async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

// ==================== Documents ====================

#[tokio::test]
async fn test_created_file_becomes_page() {
    let fx = Fixture::new();
    let path = fx.write("getting_started.md", "# Hello\n\nSome *text*");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor
        .process_event(&SyncEvent::created(&path))
        .await
        .unwrap();

    let page_id = processor.page_id_for(&path).await.unwrap();
    let page = fx.wiki.page(&page_id).unwrap();
    assert_eq!(page.title, "Getting Started");
    assert_eq!(page.parent_id, None);
    assert!(page.body.contains("<em>text</em>"));

    // Mapping was persisted
    let reloaded = fx.state();
    assert_eq!(reloaded.get_page_id(&path.to_string_lossy()), Some(page_id.as_str()));
    assert!(reloaded.get_last_sync_time(&path.to_string_lossy()).is_some());
}

#[tokio::test]
async fn test_modified_tracked_file_updates_page() {
    let fx = Fixture::new();
    let path = fx.write("guide.md", "v1");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();
    fs::write(&path, "v2").unwrap();
    processor.process_event(&SyncEvent::modified(&path)).await.unwrap();

    let page_id = processor.page_id_for(&path).await.unwrap();
    let page = fx.wiki.page(&page_id).unwrap();
    assert_eq!(page.version, 2);
    assert!(page.body.contains("v2"));
    assert_eq!(fx.creates(), 1);
}

#[tokio::test]
async fn test_stale_event_is_dropped() {
    let fx = Fixture::new();
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor
        .process_event(&SyncEvent::created(fx.docs.join("gone.md")))
        .await
        .unwrap();

    assert!(fx.wiki.calls().is_empty());
}

#[tokio::test]
async fn test_delete_untracked_is_noop() {
    let fx = Fixture::new();
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor
        .process_event(&SyncEvent::deleted(fx.docs.join("never.md")))
        .await
        .unwrap();

    assert!(fx.wiki.calls().is_empty());
}

#[tokio::test]
async fn test_delete_tracked_file() {
    let fx = Fixture::new();
    let path = fx.write("a.md", "a");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();
    let page_id = processor.page_id_for(&path).await.unwrap();
    fs::remove_file(&path).unwrap();
    processor.process_event(&SyncEvent::deleted(&path)).await.unwrap();

    assert!(fx.wiki.page(&page_id).is_none());
    assert!(processor.page_id_for(&path).await.is_none());
    assert!(fx.state().is_tombstoned(&page_id));
}

#[tokio::test]
async fn test_page_removed_remotely_is_recreated() {
    let fx = Fixture::new();
    let path = fx.write("a.md", "a");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();
    let old_id = processor.page_id_for(&path).await.unwrap();
    fx.wiki.delete_page(&old_id).await.unwrap();

    processor.process_event(&SyncEvent::modified(&path)).await.unwrap();

    let new_id = processor.page_id_for(&path).await.unwrap();
    assert_ne!(old_id, new_id);
    assert!(fx.wiki.page(&new_id).is_some());
}

#[tokio::test]
async fn test_unwritable_state_fails_the_event() {
    let fx = Fixture::new();
    let path = fx.write("guide.md", "v1");
    let processor = fx.processor(ResolutionStrategy::Skip);

    // Swap the state directory for a plain file so saving cannot succeed
    let state_dir = fx.state_file.parent().unwrap().to_path_buf();
    fs::remove_dir_all(&state_dir).unwrap();
    fs::write(&state_dir, "").unwrap();

    let result = processor.process_event(&SyncEvent::created(&path)).await;
    assert!(matches!(result, Err(SyncError::State(_))), "{result:?}");
    assert_eq!(fx.creates(), 1);

    // Once the directory is back, the mapping held in memory is persisted and reused
    fs::remove_file(&state_dir).unwrap();
    fs::create_dir(&state_dir).unwrap();
    fs::write(&path, "v2").unwrap();
    processor.process_event(&SyncEvent::modified(&path)).await.unwrap();

    assert_eq!(fx.creates(), 1);
    assert_eq!(fx.updates(), 1);
    let page_id = processor.page_id_for(&path).await.unwrap();
    assert_eq!(
        fx.state().get_page_id(&path.to_string_lossy()),
        Some(page_id.as_str())
    );
}

// ==================== Conflicts ====================

#[tokio::test]
async fn test_skip_collision_creates_nothing() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Guide", "<p>theirs</p>", None);
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    assert_eq!(fx.creates(), 0);
    assert_eq!(fx.updates(), 0);
    assert!(processor.page_id_for(&path).await.is_none());
    assert_eq!(processor.conflict_summary().get("title_conflict"), Some(&1));
}

#[tokio::test]
async fn test_append_suffix_creates_renamed_page() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Guide", "", None);
    fx.wiki.seed_page("Guide (2)", "", None);
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::AppendSuffix);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    let page_id = processor.page_id_for(&path).await.unwrap();
    assert_eq!(fx.wiki.page(&page_id).unwrap().title, "Guide (3)");

    // Later edits keep the renamed title
    fs::write(&path, "ours v2").unwrap();
    processor.process_event(&SyncEvent::modified(&path)).await.unwrap();
    let page = fx.wiki.page(&page_id).unwrap();
    assert_eq!(page.title, "Guide (3)");
    assert_eq!(page.version, 2);
}

#[tokio::test]
async fn test_overwrite_adopts_existing_page() {
    let fx = Fixture::new();
    let existing = fx.wiki.seed_page("Guide", "<p>theirs</p>", None);
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Overwrite);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    assert_eq!(fx.creates(), 0);
    assert_eq!(processor.page_id_for(&path).await, Some(existing.id.clone()));
    let page = fx.wiki.page(&existing.id).unwrap();
    assert_eq!(page.version, 2);
    assert!(page.body.contains("ours"));
}

#[tokio::test]
async fn test_abort_fails_the_event() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Guide", "", None);
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Abort);

    let result = processor.process_event(&SyncEvent::created(&path)).await;

    assert!(matches!(result, Err(SyncError::Conflict(_))));
    assert_eq!(fx.creates(), 0);
}

#[tokio::test]
async fn test_conflict_lookup_failure_proceeds() {
    let fx = Fixture::new();
    fx.wiki.fail_next("list_all_pages", 1);
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    assert_eq!(fx.creates(), 1);
    assert!(processor.page_id_for(&path).await.is_some());
}

#[tokio::test]
async fn test_append_suffix_looks_past_first_suffixes() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Guide", "", None);
    for n in 2..=10 {
        fx.wiki.seed_page(&format!("Guide ({n})"), "", None);
    }
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::AppendSuffix);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    let page_id = processor.page_id_for(&path).await.unwrap();
    assert_eq!(fx.wiki.page(&page_id).unwrap().title, "Guide (11)");
}

#[tokio::test]
async fn test_append_suffix_skips_taken_later_suffix() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Guide", "", None);
    for n in 2..=11 {
        fx.wiki.seed_page(&format!("Guide ({n})"), "", None);
    }
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::AppendSuffix);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    let page_id = processor.page_id_for(&path).await.unwrap();
    assert_eq!(fx.wiki.page(&page_id).unwrap().title, "Guide (12)");
    assert_eq!(fx.creates(), 1);
}

#[tokio::test]
async fn test_suffix_is_reused_after_its_page_is_deleted() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Guide", "", None);
    let first = fx.write("a/guide.md", "first");
    let processor = fx.processor(ResolutionStrategy::AppendSuffix);

    processor.process_event(&SyncEvent::created(&first)).await.unwrap();
    let first_id = processor.page_id_for(&first).await.unwrap();
    assert_eq!(fx.wiki.page(&first_id).unwrap().title, "Guide (2)");

    fs::remove_file(&first).unwrap();
    processor.process_event(&SyncEvent::deleted(&first)).await.unwrap();

    let second = fx.write("b/guide.md", "second");
    processor.process_event(&SyncEvent::created(&second)).await.unwrap();
    let second_id = processor.page_id_for(&second).await.unwrap();
    assert_eq!(fx.wiki.page(&second_id).unwrap().title, "Guide (2)");
}

#[tokio::test]
async fn test_interactive_renames_like_append_suffix() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Guide", "<p>theirs</p>", None);
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Interactive);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    let page_id = processor.page_id_for(&path).await.unwrap();
    assert_eq!(fx.wiki.page(&page_id).unwrap().title, "Guide (2)");
    assert!(fx.wiki.find_by_title("Guide").unwrap().body.contains("theirs"));
    assert_eq!(processor.conflict_summary().get("title_conflict"), Some(&1));
    assert!(!processor.has_unresolved_conflicts());
}

#[tokio::test]
async fn test_overwrite_refuses_previously_deleted_page() {
    let fx = Fixture::new();
    let existing = fx.wiki.seed_page("Guide", "<p>theirs</p>", None);
    {
        // An earlier run mapped and then deleted this page id
        let mut state = fx.state();
        state.add_mapping("/old/guide.md", &existing.id, 0.0).unwrap();
        state.remove_mapping("/old/guide.md").unwrap();
        assert!(state.is_tombstoned(&existing.id));
    }
    let path = fx.write("guide.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Overwrite);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    assert_eq!(fx.creates(), 0);
    assert_eq!(fx.updates(), 0);
    assert!(processor.page_id_for(&path).await.is_none());
    assert!(fx.wiki.page(&existing.id).unwrap().body.contains("theirs"));
}

#[tokio::test]
async fn test_repeated_edits_record_one_conflict() {
    let fx = Fixture::new();
    fx.wiki.seed_page("Taken", "", None);
    let orphan = fx.write("orphans/lost.md", "lost");
    let taken = fx.write("taken.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Skip);

    for _ in 0..5 {
        processor.process_event(&SyncEvent::modified(&orphan)).await.unwrap();
        processor.process_event(&SyncEvent::modified(&taken)).await.unwrap();
    }

    let summary = processor.conflict_summary();
    assert_eq!(summary.get("hierarchy_conflict"), Some(&1));
    assert_eq!(summary.get("title_conflict"), Some(&1));

    // Deleting the document clears what was recorded for it
    fs::remove_file(&orphan).unwrap();
    processor.process_event(&SyncEvent::deleted(&orphan)).await.unwrap();
    assert_eq!(processor.conflict_summary().get("hierarchy_conflict"), None);
}

#[tokio::test]
async fn test_scan_for_conflicts_reports_untracked_titles() {
    let fx = Fixture::new();
    let existing = fx.wiki.seed_page("Guide", "", None);
    fx.write("guide.md", "ours");
    fx.write("other.md", "ours");
    let processor = fx.processor(ResolutionStrategy::Skip);

    let conflicts = processor.scan_for_conflicts().await.unwrap();

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts.get("Guide"), Some(&existing.id));
    // Read-only
    assert_eq!(fx.wiki.mutations().len(), 0);
    assert!(processor.conflict_summary().is_empty());
}

// ==================== Hierarchy ====================

#[tokio::test]
async fn test_nested_file_goes_under_folder_page() {
    let fx = Fixture::new();
    let folder = fx.mkdir("user-guide");
    let file = fx.write("user-guide/install.md", "steps");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor
        .process_event(&SyncEvent::folder_created(&folder))
        .await
        .unwrap();
    processor.process_event(&SyncEvent::created(&file)).await.unwrap();

    let folder_id = processor.page_id_for(&folder).await.unwrap();
    let folder_page = fx.wiki.page(&folder_id).unwrap();
    assert_eq!(folder_page.title, "User Guide");
    assert!(folder_page.body.contains("ac:name=\"children\""));

    let file_page = fx.wiki.page(&processor.page_id_for(&file).await.unwrap()).unwrap();
    assert_eq!(file_page.parent_id, Some(folder_id));
}

#[tokio::test]
async fn test_folder_created_twice_is_idempotent() {
    let fx = Fixture::new();
    let folder = fx.mkdir("guides");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::folder_created(&folder)).await.unwrap();
    processor.process_event(&SyncEvent::folder_created(&folder)).await.unwrap();

    assert_eq!(fx.creates(), 1);
}

#[tokio::test]
async fn test_missing_parent_is_a_hierarchy_conflict() {
    let fx = Fixture::new();
    let file = fx.write("orphans/lost.md", "lost");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&file)).await.unwrap();

    let page = fx.wiki.page(&processor.page_id_for(&file).await.unwrap()).unwrap();
    assert_eq!(page.parent_id, None);
    assert_eq!(processor.conflict_summary().get("hierarchy_conflict"), Some(&1));
}

#[tokio::test]
async fn test_folder_deletion_is_deepest_first() {
    let fx = Fixture::new();
    let root = fx.mkdir("root");
    let sub = fx.mkdir("root/sub");
    let subsub = fx.mkdir("root/sub/subsub");
    let files = [
        fx.write("root/r.md", "r"),
        fx.write("root/sub/a.md", "a"),
        fx.write("root/sub/subsub/b.md", "b"),
    ];
    let processor = fx.processor(ResolutionStrategy::Skip);

    for dir in [&root, &sub, &subsub] {
        processor.process_event(&SyncEvent::folder_created(dir)).await.unwrap();
    }
    for file in &files {
        processor.process_event(&SyncEvent::created(file)).await.unwrap();
    }

    // Page id → path, to read the delete order back
    let mut owners = std::collections::HashMap::new();
    for path in [&root, &sub, &subsub].into_iter().chain(files.iter()) {
        owners.insert(processor.page_id_for(path).await.unwrap(), path.clone());
    }

    fs::remove_dir_all(&root).unwrap();
    fx.wiki.clear_calls();
    processor
        .process_event(&SyncEvent::folder_deleted(&root))
        .await
        .unwrap();

    let order: Vec<PathBuf> = fx
        .wiki
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            WikiCall::DeletePage { page_id } => owners.get(&page_id).cloned(),
            _ => None,
        })
        .collect();

    assert_eq!(order.len(), 6);
    assert_eq!(order.last(), Some(&root));
    let depths: Vec<usize> = order.iter().map(|p| p.components().count()).collect();
    assert!(depths.windows(2).all(|w| w[0] >= w[1]), "{order:?}");
    assert!(fx.wiki.pages().is_empty());
    assert!(processor.tracked_paths().await.is_empty());
}

#[tokio::test]
async fn test_renamed_directory_keeps_its_documents() {
    let fx = Fixture::new();
    let old_dir = fx.mkdir("guides");
    fx.write("guides/intro.md", "# Intro");
    fx.write("guides/deep/more.md", "# More");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::folder_created(&old_dir)).await.unwrap();
    assert_eq!(fx.wiki.pages().len(), 4);

    let new_dir = fx.docs.join("manuals");
    fs::rename(&old_dir, &new_dir).unwrap();
    processor.process_event(&SyncEvent::folder_deleted(&old_dir)).await.unwrap();
    processor.process_event(&SyncEvent::folder_created(&new_dir)).await.unwrap();

    let manuals_id = processor.page_id_for(&new_dir).await.unwrap();
    let deep_id = processor.page_id_for(&new_dir.join("deep")).await.unwrap();
    let intro = fx
        .wiki
        .page(&processor.page_id_for(&new_dir.join("intro.md")).await.unwrap())
        .unwrap();
    let more = fx
        .wiki
        .page(&processor.page_id_for(&new_dir.join("deep/more.md")).await.unwrap())
        .unwrap();

    assert_eq!(intro.parent_id.as_deref(), Some(manuals_id.as_str()));
    assert_eq!(more.parent_id.as_deref(), Some(deep_id.as_str()));
    assert_eq!(fx.wiki.pages().len(), 4);
    assert!(processor.page_id_for(&old_dir.join("intro.md")).await.is_none());
    assert!(processor.conflict_summary().is_empty());
}

#[tokio::test]
async fn test_folder_deletion_continues_past_failure() {
    let fx = Fixture::new();
    let root = fx.mkdir("root");
    let a = fx.write("root/a.md", "a");
    let b = fx.write("root/b.md", "b");
    let processor = fx.processor(ResolutionStrategy::Skip);
    processor.process_event(&SyncEvent::folder_created(&root)).await.unwrap();
    let root_id = processor.page_id_for(&root).await.unwrap();
    let a_id = processor.page_id_for(&a).await.unwrap();

    fs::remove_dir_all(&root).unwrap();
    fx.wiki.clear_calls();
    // b.md goes first and fails
    fx.wiki.fail_next("delete_page", 1);
    let result = processor.process_event(&SyncEvent::folder_deleted(&root)).await;

    let deleted: Vec<String> = fx
        .wiki
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            WikiCall::DeletePage { page_id } => Some(page_id),
            _ => None,
        })
        .collect();
    assert_eq!(deleted.len(), 3);
    assert_eq!(deleted[1], a_id);
    assert_eq!(deleted.last(), Some(&root_id));

    // The remaining child keeps the folder page alive, so the event fails
    assert!(matches!(result, Err(SyncError::Remote(_))), "{result:?}");
    assert!(fx.wiki.page(&a_id).is_none());
    assert!(processor.page_id_for(&a).await.is_none());
    assert!(processor.page_id_for(&b).await.is_some());
    assert_eq!(processor.page_id_for(&root).await, Some(root_id));
}

// ==================== Images ====================

#[tokio::test]
async fn test_local_images_are_attached() {
    let fx = Fixture::new();
    fx.write("img/chart.png", "png");
    let path = fx.write("report.md", "# Report\n\n![Chart](img/chart.png)\n\n![Gone](nope.png)\n");
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    let page_id = processor.page_id_for(&path).await.unwrap();
    let page = fx.wiki.page(&page_id).unwrap();
    assert!(page.body.contains("<ri:attachment ri:filename=\"chart.png\"/>"));
    assert!(page.body.contains("![Gone](nope.png)"));
    assert!(!page.body.contains("LOCAL_IMAGE_"));
    assert_eq!(fx.wiki.attachments(&page_id).len(), 1);

    // Page is created first, then updated with the final markup
    let mutations = fx.wiki.mutations();
    assert!(matches!(mutations[0], WikiCall::CreatePage { .. }));
    assert!(matches!(mutations[1], WikiCall::UploadAttachment { .. }));
    assert!(matches!(mutations[2], WikiCall::UpdatePage { version: 2, .. }));
}

#[tokio::test]
async fn test_failed_upload_leaves_fallback() {
    let fx = Fixture::new();
    fx.write("chart.png", "png");
    let path = fx.write("report.md", "![Chart](chart.png)");
    fx.wiki.fail_next("upload_attachment", 1);
    let processor = fx.processor(ResolutionStrategy::Skip);

    processor.process_event(&SyncEvent::created(&path)).await.unwrap();

    let page = fx
        .wiki
        .page(&processor.page_id_for(&path).await.unwrap())
        .unwrap();
    assert!(page.body.contains("<strong>Image not available:</strong> chart.png"));
    assert!(page.body.contains("<em>Chart</em>"));
}

// ==================== Worker ====================

#[tokio::test]
async fn test_initial_scan_is_idempotent() {
    let fx = Fixture::new();
    fx.write("index.md", "# Index");
    fx.write("guides/intro.md", "# Intro");
    fx.mkdir(".hidden");
    fx.write(".hidden/secret.md", "skip");

    let engine = fx.engine(Duration::from_millis(50));
    assert_eq!(engine.initial_scan().await.unwrap(), 3);
    assert!(wait_until(|| fx.wiki.pages().len() == 3).await);
    engine.stop().await;

    let engine = fx.engine(Duration::from_millis(50));
    assert_eq!(engine.tracked_paths().await.len(), 3);
    let creates_before = fx.creates();
    assert_eq!(engine.initial_scan().await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.creates(), creates_before);
    engine.stop().await;
}

#[tokio::test]
async fn test_rapid_modifications_coalesce() {
    let fx = Fixture::new();
    let path = fx.write("busy.md", "v0");
    let engine = fx.engine(Duration::from_millis(300));

    engine.enqueue(SyncEvent::created(&path)).unwrap();
    for i in 1..10 {
        fs::write(&path, format!("v{i}")).unwrap();
        engine.enqueue(SyncEvent::modified(&path)).unwrap();
    }

    assert!(wait_until(|| fx.updates() >= 1).await);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(fx.creates(), 1);
    assert_eq!(fx.updates(), 1);
    let page = fx.wiki.find_by_title("Busy").unwrap();
    assert!(page.body.contains("v9"));
    engine.stop().await;
}

#[tokio::test]
async fn test_worker_survives_failed_event() {
    let fx = Fixture::new();
    let first = fx.write("first.md", "1");
    let second = fx.write("second.md", "2");
    fx.wiki.fail_next("create_page", 1);
    let engine = fx.engine(Duration::from_millis(10));

    engine.enqueue(SyncEvent::created(&first)).unwrap();
    engine.enqueue(SyncEvent::created(&second)).unwrap();

    assert!(wait_until(|| fx.wiki.find_by_title("Second").is_some()).await);
    assert!(fx.wiki.find_by_title("First").is_none());
    engine.stop().await;
}

#[tokio::test]
async fn test_stop_without_events() {
    let fx = Fixture::new();
    let engine = fx.engine(Duration::from_secs(5));
    let sender = engine.sender();

    engine.stop().await;

    assert!(sender.send(SyncEvent::created(Path::new("/x.md"))).is_err());
}
