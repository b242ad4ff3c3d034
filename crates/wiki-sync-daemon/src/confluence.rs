//! Confluence Server/Data Center REST client.
//!
//! Every call except attachment uploads goes through the configured
//! [`RetryPolicy`]. Uploads are best-effort and report failure as `None`.

use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wiki_sync_core::remote::Result;
use wiki_sync_core::{Attachment, Page, RemoteError, RetryPolicy, WikiClient};

/// Results requested per listing call.
pub const PAGE_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct ContentJson {
    id: String,
    #[serde(default)]
    title: String,
    version: Option<VersionJson>,
    body: Option<BodyJson>,
    #[serde(default)]
    ancestors: Vec<AncestorJson>,
}

#[derive(Debug, Deserialize)]
struct VersionJson {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct BodyJson {
    storage: Option<StorageJson>,
}

#[derive(Debug, Deserialize)]
struct StorageJson {
    value: String,
}

#[derive(Debug, Deserialize)]
struct AncestorJson {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AttachmentJson {
    id: String,
    #[serde(default)]
    title: String,
}

impl From<ContentJson> for Page {
    fn from(content: ContentJson) -> Self {
        Page {
            id: content.id,
            title: content.title,
            version: content.version.map(|v| v.number).unwrap_or(0),
            parent_id: content.ancestors.last().map(|a| a.id.clone()),
            body: content
                .body
                .and_then(|b| b.storage)
                .map(|s| s.value)
                .unwrap_or_default(),
        }
    }
}

/// Request body for creating a page in `space_key`.
pub fn create_payload(space_key: &str, title: &str, body: &str, parent_id: Option<&str>) -> Value {
    let mut payload = json!({
        "type": "page",
        "title": title,
        "space": { "key": space_key },
        "body": { "storage": { "value": body, "representation": "storage" } },
    });
    if let Some(parent_id) = parent_id {
        payload["ancestors"] = json!([{ "id": parent_id }]);
    }
    payload
}

/// Request body for replacing a page; `version` is the number being submitted.
pub fn update_payload(space_key: &str, page_id: &str, title: &str, body: &str, version: u64) -> Value {
    json!({
        "id": page_id,
        "type": "page",
        "title": title,
        "space": { "key": space_key },
        "body": { "storage": { "value": body, "representation": "storage" } },
        "version": { "number": version },
    })
}

pub struct ConfluenceClient {
    http: Client,
    base_url: String,
    space_key: String,
    token: String,
    retry: RetryPolicy,
}

impl ConfluenceClient {
    pub fn new(
        base_url: &str,
        space_key: &str,
        token: &str,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("wiki-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;

        info!("Initialized Confluence client for space {}", space_key);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            space_key: space_key.to_string(),
            token: token.to_string(),
            retry,
        })
    }

    pub fn space_key(&self) -> &str {
        &self.space_key
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        check_status(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn create_once(&self, payload: &Value) -> Result<Page> {
        let request = self.http.post(self.url("rest/api/content/")).json(payload);
        let response = self.send(request).await?;
        Ok(Self::read_json::<ContentJson>(response).await?.into())
    }

    async fn get_once(&self, page_id: &str) -> Result<Page> {
        let request = self
            .http
            .get(self.url(&format!("rest/api/content/{}", page_id)))
            .query(&[("expand", "version,body.storage,ancestors")]);
        let response = self.send(request).await?;
        Ok(Self::read_json::<ContentJson>(response).await?.into())
    }

    async fn put_once(&self, page_id: &str, payload: &Value) -> Result<Page> {
        let request = self
            .http
            .put(self.url(&format!("rest/api/content/{}", page_id)))
            .json(payload);
        let response = self.send(request).await?;
        Ok(Self::read_json::<ContentJson>(response).await?.into())
    }

    async fn delete_once(&self, page_id: &str) -> Result<()> {
        let request = self
            .http
            .delete(self.url(&format!("rest/api/content/{}", page_id)));
        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(RemoteError::NotFound(_)) => {
                warn!("Page {} was already deleted", page_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn by_title_once(&self, title: &str) -> Result<Option<Page>> {
        let request = self.http.get(self.url("rest/api/content")).query(&[
            ("spaceKey", self.space_key.as_str()),
            ("title", title),
            ("type", "page"),
            ("expand", "version"),
        ]);
        let response = self.send(request).await?;
        let listing = Self::read_json::<Listing<ContentJson>>(response).await?;
        Ok(listing.results.into_iter().next().map(Page::from))
    }

    async fn listing_once(&self, start: usize) -> Result<Listing<ContentJson>> {
        let start = start.to_string();
        let limit = PAGE_LIMIT.to_string();
        let request = self.http.get(self.url("rest/api/content")).query(&[
            ("spaceKey", self.space_key.as_str()),
            ("type", "page"),
            ("start", start.as_str()),
            ("limit", limit.as_str()),
        ]);
        let response = self.send(request).await?;
        Self::read_json(response).await
    }

    /// Remove an attachment with the same file name so the upload replaces it.
    async fn delete_existing_attachment(&self, page_id: &str, filename: &str) {
        let request = self
            .http
            .get(self.url(&format!("rest/api/content/{}/child/attachment", page_id)))
            .query(&[("filename", filename)]);
        let listing = match self.send(request).await {
            Ok(response) => Self::read_json::<Listing<AttachmentJson>>(response).await,
            Err(e) => Err(e),
        };
        let attachments = match listing {
            Ok(listing) => listing.results,
            Err(e) => {
                warn!("Could not list attachments of page {}: {}", page_id, e);
                return;
            }
        };

        if let Some(existing) = attachments.iter().find(|a| a.title == filename) {
            let request = self
                .http
                .delete(self.url(&format!("rest/api/content/{}", existing.id)));
            match self.send(request).await {
                Ok(_) => debug!("Deleted existing attachment {}", filename),
                Err(e) => warn!("Could not delete existing attachment {}: {}", filename, e),
            }
        }
    }

    async fn upload_once(&self, page_id: &str, file: &Path, filename: &str) -> Result<Attachment> {
        let data = tokio::fs::read(file)
            .await
            .map_err(|e| RemoteError::Network(format!("{}: {}", file.display(), e)))?;
        let part = multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let request = self
            .http
            .post(self.url(&format!("rest/api/content/{}/child/attachment", page_id)))
            .header("X-Atlassian-Token", "no-check")
            .multipart(form);
        let response = self.send(request).await?;

        // The endpoint answers with a listing of the created attachments
        let body: Value = Self::read_json(response).await?;
        let id = body["results"][0]["id"]
            .as_str()
            .or_else(|| body["id"].as_str())
            .unwrap_or_default()
            .to_string();
        Ok(Attachment {
            id,
            page_id: page_id.to_string(),
            filename: filename.to_string(),
        })
    }
}

/// Map non-success responses onto [`RemoteError`].
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let message = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        StatusCode::NOT_FOUND => {
            debug!("Not found: {}", url);
            RemoteError::NotFound(url)
        }
        _ => {
            error!("Request to {} failed: {} - {}", url, status, message);
            RemoteError::Http {
                status: status.as_u16(),
                message,
            }
        }
    })
}

#[async_trait]
impl WikiClient for ConfluenceClient {
    async fn create_page(&self, title: &str, body: &str, parent_id: Option<&str>) -> Result<Page> {
        info!("Creating page: {}", title);
        let payload = create_payload(&self.space_key, title, body, parent_id);
        let payload = &payload;
        self.retry
            .run("create_page", move || self.create_once(payload))
            .await
    }

    async fn update_page(&self, page_id: &str, title: &str, body: &str) -> Result<Page> {
        info!("Updating page: {} (ID: {})", title, page_id);
        let current = self
            .retry
            .run("get_page", move || self.get_once(page_id))
            .await?;

        let payload = update_payload(&self.space_key, page_id, title, body, current.version + 1);
        let payload = &payload;
        self.retry
            .run("update_page", move || self.put_once(page_id, payload))
            .await
    }

    async fn delete_page(&self, page_id: &str) -> Result<()> {
        info!("Deleting page with ID: {}", page_id);
        self.retry
            .run("delete_page", move || self.delete_once(page_id))
            .await
    }

    async fn get_page(&self, page_id: &str) -> Result<Page> {
        debug!("Retrieving page with ID: {}", page_id);
        self.retry
            .run("get_page", move || self.get_once(page_id))
            .await
    }

    async fn get_page_by_title(&self, title: &str) -> Result<Option<Page>> {
        debug!("Retrieving page by title: {}", title);
        self.retry
            .run("get_page_by_title", move || self.by_title_once(title))
            .await
    }

    async fn list_all_pages(&self) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        let mut start = 0;

        loop {
            let listing = self
                .retry
                .run("list_pages", move || self.listing_once(start))
                .await?;
            let count = listing.results.len();
            let size = listing.size.unwrap_or(count);
            pages.extend(listing.results.into_iter().map(Page::from));

            if count < PAGE_LIMIT || size < PAGE_LIMIT {
                break;
            }
            start += PAGE_LIMIT;
        }

        info!(
            "Retrieved {} pages from space {}",
            pages.len(),
            self.space_key
        );
        Ok(pages)
    }

    async fn upload_attachment(&self, page_id: &str, file: &Path) -> Option<Attachment> {
        if !file.is_file() {
            error!("Attachment not found: {}", file.display());
            return None;
        }
        let filename = file.file_name()?.to_string_lossy().into_owned();
        info!("Uploading attachment {} to page {}", filename, page_id);

        self.delete_existing_attachment(page_id, &filename).await;
        match self.upload_once(page_id, file, &filename).await {
            Ok(attachment) => {
                info!("Uploaded attachment {}", filename);
                Some(attachment)
            }
            Err(e) => {
                error!("Failed to upload attachment {}: {}", filename, e);
                None
            }
        }
    }
}
