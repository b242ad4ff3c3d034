use super::{Attachment, Page, RemoteError, Result, WikiClient};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// One call made against an [`InMemoryWiki`], in the order received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WikiCall {
    CreatePage {
        title: String,
        parent_id: Option<String>,
    },
    UpdatePage {
        page_id: String,
        title: String,
        version: u64,
    },
    DeletePage {
        page_id: String,
    },
    GetPage {
        page_id: String,
    },
    GetPageByTitle {
        title: String,
    },
    ListAllPages,
    UploadAttachment {
        page_id: String,
        filename: String,
    },
}

impl WikiCall {
    fn operation(&self) -> &'static str {
        match self {
            WikiCall::CreatePage { .. } => "create_page",
            WikiCall::UpdatePage { .. } => "update_page",
            WikiCall::DeletePage { .. } => "delete_page",
            WikiCall::GetPage { .. } => "get_page",
            WikiCall::GetPageByTitle { .. } => "get_page_by_title",
            WikiCall::ListAllPages => "list_all_pages",
            WikiCall::UploadAttachment { .. } => "upload_attachment",
        }
    }
}

#[derive(Default)]
struct Space {
    pages: BTreeMap<String, Page>,
    attachments: BTreeMap<String, Vec<Attachment>>,
    calls: Vec<WikiCall>,
    /// operation name → number of upcoming calls that fail
    failures: HashMap<&'static str, u32>,
    next_id: u64,
}

impl Space {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        (1000 + self.next_id).to_string()
    }

    fn title_taken(&self, title: &str, except: Option<&str>) -> bool {
        self.pages
            .values()
            .any(|p| p.title == title && Some(p.id.as_str()) != except)
    }

    /// Record the call and consume an injected failure if one is pending.
    fn begin(&mut self, call: WikiCall) -> Result<()> {
        let operation = call.operation();
        self.calls.push(call);
        if let Some(remaining) = self.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Http {
                    status: 500,
                    message: format!("injected failure for {operation}"),
                });
            }
        }
        Ok(())
    }
}

/// In-process wiki space for testing.
///
/// Enforces unique titles and monotonic versions, refuses to delete pages that
/// still have children, and records every call.
#[derive(Default)]
pub struct InMemoryWiki {
    space: Mutex<Space>,
}

impl InMemoryWiki {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Space> {
        self.space.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a page directly, without recording a call.
    pub fn seed_page(&self, title: &str, body: &str, parent_id: Option<&str>) -> Page {
        let mut space = self.lock();
        let page = Page {
            id: space.allocate_id(),
            title: title.to_string(),
            version: 1,
            parent_id: parent_id.map(str::to_string),
            body: body.to_string(),
        };
        space.pages.insert(page.id.clone(), page.clone());
        page
    }

    /// Make the next `count` calls of `operation` (e.g. `"create_page"`) fail.
    pub fn fail_next(&self, operation: &'static str, count: u32) {
        self.lock().failures.insert(operation, count);
    }

    pub fn calls(&self) -> Vec<WikiCall> {
        self.lock().calls.clone()
    }

    /// Calls other than reads, which is what most assertions care about.
    pub fn mutations(&self) -> Vec<WikiCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    WikiCall::CreatePage { .. }
                        | WikiCall::UpdatePage { .. }
                        | WikiCall::DeletePage { .. }
                        | WikiCall::UploadAttachment { .. }
                )
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn page(&self, page_id: &str) -> Option<Page> {
        self.lock().pages.get(page_id).cloned()
    }

    pub fn find_by_title(&self, title: &str) -> Option<Page> {
        self.lock().pages.values().find(|p| p.title == title).cloned()
    }

    pub fn pages(&self) -> Vec<Page> {
        self.lock().pages.values().cloned().collect()
    }

    pub fn attachments(&self, page_id: &str) -> Vec<Attachment> {
        self.lock()
            .attachments
            .get(page_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl WikiClient for InMemoryWiki {
    async fn create_page(&self, title: &str, body: &str, parent_id: Option<&str>) -> Result<Page> {
        let mut space = self.lock();
        space.begin(WikiCall::CreatePage {
            title: title.to_string(),
            parent_id: parent_id.map(str::to_string),
        })?;

        if space.title_taken(title, None) {
            return Err(RemoteError::Http {
                status: 400,
                message: format!("A page with title '{title}' already exists"),
            });
        }
        if let Some(parent) = parent_id {
            if !space.pages.contains_key(parent) {
                return Err(RemoteError::NotFound(parent.to_string()));
            }
        }

        let page = Page {
            id: space.allocate_id(),
            title: title.to_string(),
            version: 1,
            parent_id: parent_id.map(str::to_string),
            body: body.to_string(),
        };
        debug!("Created page {} '{}'", page.id, page.title);
        space.pages.insert(page.id.clone(), page.clone());
        Ok(page)
    }

    async fn update_page(&self, page_id: &str, title: &str, body: &str) -> Result<Page> {
        let mut space = self.lock();
        let version = space
            .pages
            .get(page_id)
            .map(|p| p.version + 1)
            .unwrap_or(0);
        space.begin(WikiCall::UpdatePage {
            page_id: page_id.to_string(),
            title: title.to_string(),
            version,
        })?;

        if space.title_taken(title, Some(page_id)) {
            return Err(RemoteError::Http {
                status: 400,
                message: format!("A page with title '{title}' already exists"),
            });
        }
        let page = space
            .pages
            .get_mut(page_id)
            .ok_or_else(|| RemoteError::NotFound(page_id.to_string()))?;
        if version <= page.version {
            return Err(RemoteError::Http {
                status: 409,
                message: format!("Version {version} is stale"),
            });
        }
        page.version = version;
        page.title = title.to_string();
        page.body = body.to_string();
        Ok(page.clone())
    }

    async fn delete_page(&self, page_id: &str) -> Result<()> {
        let mut space = self.lock();
        space.begin(WikiCall::DeletePage {
            page_id: page_id.to_string(),
        })?;

        if !space.pages.contains_key(page_id) {
            return Err(RemoteError::NotFound(page_id.to_string()));
        }
        if space
            .pages
            .values()
            .any(|p| p.parent_id.as_deref() == Some(page_id))
        {
            return Err(RemoteError::Http {
                status: 400,
                message: format!("Page {page_id} still has children"),
            });
        }
        space.pages.remove(page_id);
        space.attachments.remove(page_id);
        Ok(())
    }

    async fn get_page(&self, page_id: &str) -> Result<Page> {
        let mut space = self.lock();
        space.begin(WikiCall::GetPage {
            page_id: page_id.to_string(),
        })?;
        space
            .pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(page_id.to_string()))
    }

    async fn get_page_by_title(&self, title: &str) -> Result<Option<Page>> {
        let mut space = self.lock();
        space.begin(WikiCall::GetPageByTitle {
            title: title.to_string(),
        })?;
        Ok(space.pages.values().find(|p| p.title == title).cloned())
    }

    async fn list_all_pages(&self) -> Result<Vec<Page>> {
        let mut space = self.lock();
        space.begin(WikiCall::ListAllPages)?;
        Ok(space.pages.values().cloned().collect())
    }

    async fn upload_attachment(&self, page_id: &str, file: &Path) -> Option<Attachment> {
        let filename = file.file_name()?.to_string_lossy().into_owned();
        let mut space = self.lock();
        space
            .begin(WikiCall::UploadAttachment {
                page_id: page_id.to_string(),
                filename: filename.clone(),
            })
            .ok()?;

        if !file.is_file() || !space.pages.contains_key(page_id) {
            return None;
        }

        let id = space.allocate_id();
        let attachments = space.attachments.entry(page_id.to_string()).or_default();
        attachments.retain(|a| a.filename != filename);
        let attachment = Attachment {
            id,
            page_id: page_id.to_string(),
            filename,
        };
        attachments.push(attachment.clone());
        Some(attachment)
    }
}
