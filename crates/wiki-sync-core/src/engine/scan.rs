//! Walks the documents tree for the initial scan and the conflict scan.

use crate::events::SyncEvent;
use crate::paths;
use crate::state::SyncState;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Qualifying directories (shallowest first) and markdown files under a root.
#[derive(Debug, Default)]
pub struct Tree {
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// Collect every directory and `.md` file under `root`, skipping hidden and
/// ignored directories. The root itself is not included.
pub fn walk(root: &Path) -> Tree {
    let mut tree = Tree::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read directory {}: {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                if paths::is_ignored_segment(&name) {
                    debug!("Skipping directory {}", path.display());
                    continue;
                }
                tree.dirs.push(paths::normalize(&path));
                stack.push(path);
            } else if paths::is_markdown(&path) && !name.starts_with('.') {
                tree.files.push(paths::normalize(&path));
            }
        }
    }

    tree.dirs
        .sort_by(|a, b| paths::depth(a).cmp(&paths::depth(b)).then_with(|| a.cmp(b)));
    tree.files.sort();
    tree
}

/// `FolderCreated` for untracked directories, then `Created` for untracked files.
pub fn untracked_events(tree: &Tree, state: &SyncState) -> Vec<SyncEvent> {
    let untracked = |p: &&PathBuf| state.get_page_id(&paths::key(p)).is_none();

    let folders = tree
        .dirs
        .iter()
        .filter(untracked)
        .map(|d| SyncEvent::folder_created(d.clone()));
    let files = tree
        .files
        .iter()
        .filter(untracked)
        .map(|f| SyncEvent::created(f.clone()));
    folders.chain(files).collect()
}
