//! Remote wiki abstraction.
//!
//! Implementations:
//! - `InMemoryWiki` - For testing
//! - `ConfluenceClient` (in wiki-sync-daemon) - REST API over reqwest

mod memory;
mod retry;

pub use memory::{InMemoryWiki, WikiCall};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Rate limited by remote")]
    RateLimited,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// HTTP 429, always retried.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::RateLimited)
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// A page as seen by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    /// Monotonic version number, starting at 1
    pub version: u64,
    pub parent_id: Option<String>,
    /// Storage-markup body, empty when the listing did not include it
    pub body: String,
}

/// A file attached to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub page_id: String,
    pub filename: String,
}

/// Operations the sync engine needs from the wiki.
///
/// Implementations must be `Send + Sync`; the engine calls them from its worker task.
#[async_trait]
pub trait WikiClient: Send + Sync {
    /// Create a page, optionally under `parent_id`.
    async fn create_page(&self, title: &str, body: &str, parent_id: Option<&str>) -> Result<Page>;

    /// Replace title and body, submitting the current version + 1.
    async fn update_page(&self, page_id: &str, title: &str, body: &str) -> Result<Page>;

    async fn delete_page(&self, page_id: &str) -> Result<()>;

    async fn get_page(&self, page_id: &str) -> Result<Page>;

    async fn get_page_by_title(&self, title: &str) -> Result<Option<Page>>;

    /// Every page in the space, across all result pages.
    async fn list_all_pages(&self) -> Result<Vec<Page>>;

    /// Attach a local file to a page, replacing a same-named attachment.
    ///
    /// Returns `None` when the upload failed for any reason.
    async fn upload_attachment(&self, page_id: &str, file: &Path) -> Option<Attachment>;

    /// Subset of `titles` that already exist, mapped to their page ids.
    async fn check_title_conflicts(&self, titles: &[String]) -> Result<HashMap<String, String>> {
        info!("Checking {} titles for conflicts", titles.len());
        let existing: HashMap<String, String> = self
            .list_all_pages()
            .await?
            .into_iter()
            .filter(|p| !p.title.is_empty() && !p.id.is_empty())
            .map(|p| (p.title, p.id))
            .collect();

        let mut conflicts = HashMap::new();
        for title in titles {
            if let Some(id) = existing.get(title) {
                warn!("Title '{}' already exists (id {})", title, id);
                conflicts.insert(title.clone(), id.clone());
            }
        }
        Ok(conflicts)
    }
}
