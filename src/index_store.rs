//! Loading and caching of the persisted embedding index.
//!
//! The index is a JSON array of [`IndexEntry`] produced by `folio ingest`.
//! Loading never fails the caller: a missing file, a non-2xx response, a
//! non-JSON content type (for example an HTML fallback page served with
//! status 200), or a parse error all degrade to an empty index, which
//! retrieval treats as "no context".
//!
//! [`IndexStore`] holds the loaded index for its own lifetime. There is no
//! refresh path; a new process picks up a new file. Concurrent first calls
//! may each fetch the index, which is harmless because loads are
//! read-only and equivalent; the first stored value is kept.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::Config;
use crate::models::IndexEntry;

/// Raw result of fetching the index resource.
#[derive(Debug, Clone)]
pub struct FetchedIndex {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// Fetches the raw index resource from wherever it is served.
#[async_trait]
pub trait IndexFetcher: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<FetchedIndex>;

    /// Human-readable location for log messages.
    fn location(&self) -> String;
}

/// Reads the index from a local file.
///
/// Status is 200 when the file is readable and 404 otherwise; the content
/// type is derived from the file extension.
pub struct FileIndexFetcher {
    path: PathBuf,
}

impl FileIndexFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IndexFetcher for FileIndexFetcher {
    async fn fetch(&self) -> anyhow::Result<FetchedIndex> {
        let content_type = content_type_for(&self.path).to_string();
        match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => Ok(FetchedIndex {
                status: 200,
                content_type,
                body,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FetchedIndex {
                status: 404,
                content_type,
                body: String::new(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Fetches the index over HTTP(S) with a GET request.
pub struct HttpIndexFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpIndexFetcher {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IndexFetcher for HttpIndexFetcher {
    async fn fetch(&self) -> anyhow::Result<FetchedIndex> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;
        Ok(FetchedIndex {
            status,
            content_type,
            body,
        })
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

/// Build the fetcher named by `[index]`: `url` when set, else `path`.
pub fn fetcher_from_config(config: &Config) -> anyhow::Result<Arc<dyn IndexFetcher>> {
    match config.index.url.as_deref() {
        Some(url) => Ok(Arc::new(HttpIndexFetcher::new(url)?)),
        None => Ok(Arc::new(FileIndexFetcher::new(&config.index.path))),
    }
}

/// Fetch and parse the index, degrading every failure to an empty index.
pub async fn fetch_index(fetcher: &dyn IndexFetcher) -> Vec<IndexEntry> {
    let location = fetcher.location();
    let fetched = match fetcher.fetch().await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(%location, error = %e, "index unavailable; continuing without context");
            return Vec::new();
        }
    };

    if !(200..300).contains(&fetched.status) {
        tracing::warn!(%location, status = fetched.status, "index unavailable; continuing without context");
        return Vec::new();
    }

    if !fetched.content_type.contains("application/json") {
        tracing::warn!(
            %location,
            content_type = %fetched.content_type,
            "index is not JSON; continuing without context"
        );
        return Vec::new();
    }

    match serde_json::from_str::<Vec<IndexEntry>>(&fetched.body) {
        Ok(entries) => {
            tracing::info!(%location, entries = entries.len(), "index loaded");
            entries
        }
        Err(e) => {
            tracing::warn!(%location, error = %e, "index failed to parse; continuing without context");
            Vec::new()
        }
    }
}

/// Lazily loaded, process-lifetime index.
///
/// Construct once and share (it is cheap to wrap in an `Arc`); tests build
/// their own instance around a stub [`IndexFetcher`].
pub struct IndexStore {
    fetcher: Arc<dyn IndexFetcher>,
    cache: OnceLock<Arc<Vec<IndexEntry>>>,
}

impl IndexStore {
    pub fn new(fetcher: Arc<dyn IndexFetcher>) -> Self {
        Self {
            fetcher,
            cache: OnceLock::new(),
        }
    }

    /// A store whose index is already known. Used by tools and tests.
    pub fn preloaded(entries: Vec<IndexEntry>) -> Self {
        let store = Self::new(Arc::new(FileIndexFetcher::new(PathBuf::new())));
        let _ = store.cache.set(Arc::new(entries));
        store
    }

    /// Return the index, fetching it on first use.
    pub async fn load(&self) -> Arc<Vec<IndexEntry>> {
        if let Some(index) = self.cache.get() {
            return index.clone();
        }
        let entries = Arc::new(fetch_index(self.fetcher.as_ref()).await);
        // Another caller may have finished first; keep whichever landed.
        let _ = self.cache.set(entries);
        self.cache.get().cloned().unwrap_or_default()
    }

    /// The cached index, if it has been loaded.
    pub fn get(&self) -> Option<Arc<Vec<IndexEntry>>> {
        self.cache.get().cloned()
    }
}
