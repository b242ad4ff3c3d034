//! Title conflict detection and resolution.
//!
//! A conflict exists when a page we are about to create has exactly the same title
//! as a page already in the space. The [`ResolutionStrategy`] decides what happens.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("Sync aborted due to conflict: {0}")]
    Aborted(ConflictInfo),
}

/// What to do with a title that already exists remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Do not create the page
    #[default]
    Skip,
    /// Create the page under `Title (n)`
    AppendSuffix,
    /// Reuse the existing page
    Overwrite,
    /// Ask an operator (no surface is wired up, behaves like `AppendSuffix`)
    Interactive,
    /// Fail the event
    Abort,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::Skip => "skip",
            ResolutionStrategy::AppendSuffix => "append_suffix",
            ResolutionStrategy::Overwrite => "overwrite",
            ResolutionStrategy::Interactive => "interactive",
            ResolutionStrategy::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Page title already exists in the space
    TitleConflict,
    /// Parent page for a nested path could not be resolved
    HierarchyConflict,
}

impl ConflictKind {
    /// Label used in summaries.
    pub fn label(self) -> &'static str {
        match self {
            ConflictKind::TitleConflict => "title_conflict",
            ConflictKind::HierarchyConflict => "hierarchy_conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictInfo {
    pub kind: ConflictKind,
    pub local_path: PathBuf,
    pub proposed_title: String,
    pub existing_page_id: Option<String>,
    pub existing_title: Option<String>,
    pub resolution: Option<ResolutionStrategy>,
    pub resolved_title: Option<String>,
}

impl ConflictInfo {
    fn new(kind: ConflictKind, local_path: &Path, proposed_title: &str) -> Self {
        Self {
            kind,
            local_path: local_path.to_path_buf(),
            proposed_title: proposed_title.to_string(),
            existing_page_id: None,
            existing_title: None,
            resolution: None,
            resolved_title: None,
        }
    }

    /// Same conflict as `other`, ignoring resolution state.
    fn same_subject(&self, other: &ConflictInfo) -> bool {
        self.kind == other.kind
            && self.local_path == other.local_path
            && self.proposed_title == other.proposed_title
    }
}

impl fmt::Display for ConflictInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} (proposed '{}', existing id {})",
            self.kind.label(),
            self.local_path.display(),
            self.proposed_title,
            self.existing_page_id.as_deref().unwrap_or("none")
        )
    }
}

/// Detects title collisions and keeps a rolling list of everything it found.
///
/// The list holds at most one entry per subject (kind, path and title); a
/// repeat detection replaces the earlier entry.
pub struct ConflictDetector {
    default_strategy: ResolutionStrategy,
    detected: Vec<ConflictInfo>,
    /// Remote titles seen by the latest detection, plus titles handed out by
    /// `AppendSuffix` since then.
    known_titles: HashSet<String>,
}

impl ConflictDetector {
    pub fn new(default_strategy: ResolutionStrategy) -> Self {
        Self {
            default_strategy,
            detected: Vec::new(),
            known_titles: HashSet::new(),
        }
    }

    pub fn default_strategy(&self) -> ResolutionStrategy {
        self.default_strategy
    }

    /// Exact, case-sensitive intersection of proposed titles with existing ones.
    ///
    /// `proposed` maps local path → title, `existing` maps title → page id.
    pub fn detect_title_conflicts(
        &mut self,
        proposed: &BTreeMap<PathBuf, String>,
        existing: &HashMap<String, String>,
    ) -> Vec<ConflictInfo> {
        self.known_titles = existing.keys().cloned().collect();

        let mut conflicts = Vec::new();
        for (path, title) in proposed {
            if let Some(page_id) = existing.get(title) {
                let mut conflict = ConflictInfo::new(ConflictKind::TitleConflict, path, title);
                conflict.existing_page_id = Some(page_id.clone());
                conflict.existing_title = Some(title.clone());
                warn!("Title conflict detected: {}", conflict);
                conflicts.push(conflict);
            }
        }

        for conflict in &conflicts {
            self.remember(conflict.clone());
        }
        conflicts
    }

    /// Note a nested path whose parent directory has no page.
    pub fn record_hierarchy_conflict(&mut self, path: &Path, title: &str) -> ConflictInfo {
        let conflict = ConflictInfo::new(ConflictKind::HierarchyConflict, path, title);
        warn!("Hierarchy conflict detected: {}", conflict);
        self.remember(conflict.clone());
        conflict
    }

    fn remember(&mut self, conflict: ConflictInfo) {
        match self.detected.iter_mut().find(|c| c.same_subject(&conflict)) {
            Some(entry) => *entry = conflict,
            None => self.detected.push(conflict),
        }
    }

    /// Drop every entry recorded for `path`, e.g. once its document is deleted.
    pub fn forget_path(&mut self, path: &Path) {
        self.detected.retain(|c| c.local_path != path);
    }

    /// Apply `strategy` (or the default) to every conflict.
    ///
    /// Every returned entry has `resolution` set; `resolved_title` is `None` when
    /// the page must not be created.
    pub fn resolve(
        &mut self,
        conflicts: Vec<ConflictInfo>,
        strategy: Option<ResolutionStrategy>,
    ) -> Result<Vec<ConflictInfo>, ConflictError> {
        let strategy = strategy.unwrap_or(self.default_strategy);
        let mut resolved = Vec::with_capacity(conflicts.len());

        for mut conflict in conflicts {
            let title = match strategy {
                ResolutionStrategy::Skip => None,
                ResolutionStrategy::AppendSuffix => {
                    Some(self.unique_title(&conflict.proposed_title))
                }
                ResolutionStrategy::Overwrite => Some(conflict.proposed_title.clone()),
                ResolutionStrategy::Interactive => {
                    warn!("Interactive resolution is not available, using append_suffix");
                    Some(self.unique_title(&conflict.proposed_title))
                }
                ResolutionStrategy::Abort => {
                    conflict.resolution = Some(ResolutionStrategy::Abort);
                    self.record_resolution(&conflict);
                    return Err(ConflictError::Aborted(conflict));
                }
            };

            match &title {
                Some(t) => info!("Resolved conflict for '{}' -> '{}'", conflict.proposed_title, t),
                None => info!("Skipped conflicting page '{}'", conflict.proposed_title),
            }
            conflict.resolution = Some(if title.is_some() {
                strategy
            } else {
                ResolutionStrategy::Skip
            });
            conflict.resolved_title = title;
            self.record_resolution(&conflict);
            resolved.push(conflict);
        }

        Ok(resolved)
    }

    fn record_resolution(&mut self, conflict: &ConflictInfo) {
        if let Some(entry) = self
            .detected
            .iter_mut()
            .rev()
            .find(|c| c.resolution.is_none() && c.same_subject(conflict))
        {
            entry.resolution = conflict.resolution;
            entry.resolved_title = conflict.resolved_title.clone();
        }
    }

    /// Smallest `base (n)` with `n >= 2` that is not a known title.
    fn unique_title(&mut self, base: &str) -> String {
        let mut n = 2u32;
        loop {
            let candidate = format!("{base} ({n})");
            if !self.known_titles.contains(&candidate) {
                self.known_titles.insert(candidate.clone());
                return candidate;
            }
            n += 1;
        }
    }

    /// Conflict kind label → count over the rolling list.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for conflict in &self.detected {
            *summary.entry(conflict.kind.label().to_string()).or_insert(0) += 1;
        }
        summary
    }

    pub fn detected(&self) -> &[ConflictInfo] {
        &self.detected
    }

    pub fn has_unresolved_conflicts(&self) -> bool {
        self.detected.iter().any(|c| c.resolution.is_none())
    }

    pub fn clear(&mut self) {
        self.detected.clear();
        self.known_titles.clear();
    }
}
