//! Path helpers shared by the watcher, the scans and the engine.
//!
//! Every path that reaches the state store goes through [`normalize`] first, so the
//! same filesystem object always maps to a single key.

use std::path::{Component, Path, PathBuf};

/// Directory names that are never mirrored (in addition to hidden directories).
pub const SKIP_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    ".vscode",
    ".idea",
    "node_modules",
    ".pytest_cache",
];

/// Extension of documents that are synced.
pub const MARKDOWN_EXTENSION: &str = "md";

/// Resolve symlinks and `.`/`..` segments.
///
/// Paths that no longer exist (deleted files) are resolved through their nearest
/// existing ancestor so they still produce the key they had while they existed.
pub fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let lexical = lexical_normalize(path);
    let mut missing = Vec::new();
    let mut ancestor = lexical.as_path();
    loop {
        if let Ok(canonical) = ancestor.canonicalize() {
            let mut resolved = canonical;
            for name in missing.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
        match (ancestor.file_name(), ancestor.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                ancestor = parent;
            }
            _ => return lexical,
        }
    }
}

/// Remove `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// String key used by the state store.
pub fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Whether a single path segment names a hidden or skipped directory.
pub fn is_ignored_segment(segment: &str) -> bool {
    segment.starts_with('.') || SKIP_DIRS.contains(&segment)
}

/// Whether any segment of a root-relative path is hidden or skipped.
pub fn has_ignored_segment(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => is_ignored_segment(&name.to_string_lossy()),
        _ => false,
    })
}

/// Whether the path names a markdown document.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == MARKDOWN_EXTENSION)
        .unwrap_or(false)
}

/// Number of components, used to order folders shallowest/deepest first.
pub fn depth(path: &Path) -> usize {
    path.components().count()
}

/// Derive a page title from a file or directory name.
///
/// `getting_started.md` → `Getting Started`, `api-v2` → `Api V2`.
pub fn page_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    title_case(&stem.replace(['_', '-'], " "))
}

/// Capitalize the first letter of every run of letters and lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}
