//! Schema retrieval: local search-path overrides, HTTP, and the worker thread
//! that lets synchronous callers wait on asynchronous fetches.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use thiserror::Error;

use crate::config::{ConfigurationProvider, SearchOptions};
use crate::file_cache::FileCache;

/// Upper bound on a single schema fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to '{url}' failed: {reason}")]
    Request { url: String, reason: String },
    #[error("'{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("no schema available for '{url}'")]
    NotFound { url: String },
    #[error("timed out after {}s fetching '{url}'", timeout.as_secs())]
    Timeout { url: String, timeout: Duration },
    #[error("fetch worker is not running")]
    WorkerGone,
    #[error("failed to start fetch worker: {0}")]
    Worker(String),
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>>;

/// Retrieves the raw body of a schema by URL.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Network retrieval over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("jsls/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Worker(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetch {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let request_error = |e: reqwest::Error| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            };
            let resp = self.client.get(url).send().await.map_err(request_error)?;
            if !resp.status().is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
            }
            let body = resp.bytes().await.map_err(request_error)?;
            tracing::debug!(url, bytes = body.len(), "fetched schema");
            Ok(body.to_vec())
        })
    }
}

/// Fixed in-memory schema bodies. Counts the requests it serves.
#[derive(Debug, Default)]
pub struct StaticFetch {
    bodies: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl StaticFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Fetch for StaticFetch {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let result = self
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                url: url.to_string(),
            });
        Box::pin(async move { result })
    }
}

/// Serves schemas from local search paths when the URL matches the
/// configured pattern.
#[derive(Debug, Clone)]
pub struct LocalOverride {
    config: Arc<ConfigurationProvider>,
    file_cache: Arc<FileCache>,
}

impl LocalOverride {
    pub fn new(config: Arc<ConfigurationProvider>, file_cache: Arc<FileCache>) -> Self {
        Self { config, file_cache }
    }

    /// Local body for `url`, from the file cache or a search-path match.
    pub fn lookup(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        if let Some(content) = self.file_cache.try_get(url) {
            tracing::debug!(url, "file cache hit");
            return Some(content);
        }
        let options = self.config.current().search_options()?;
        let path = find_local_schema(&options, url)?;
        let content = match std::fs::read(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    url,
                    path = %path.display(),
                    error = %e,
                    "could not read local schema"
                );
                return None;
            }
        };
        tracing::debug!(url, path = %path.display(), "serving schema from search path");
        match self.file_cache.add(url, &path, content.clone()) {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!(url, error = %e, "could not cache local schema");
                Some(Arc::new(content))
            }
        }
    }
}

/// Find the first file under the search paths that matches one of the globs
/// after the URL pattern has been substituted into them.
///
/// Search paths are tried in order; within a path files are visited sorted
/// by name and matched relative to the search path, case-insensitively.
pub fn find_local_schema(options: &SearchOptions, url: &str) -> Option<PathBuf> {
    if !options.url_pattern.is_match(url) {
        return None;
    }
    let globs = build_globset(options, url)?;
    options
        .paths
        .iter()
        .find_map(|root| find_in_search_path(root, &globs))
}

fn build_globset(options: &SearchOptions, url: &str) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in &options.globs {
        let template = brace_group_refs(glob);
        let expanded = options.url_pattern.replace_all(url, template.as_str());
        match GlobBuilder::new(&expanded)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
        {
            Ok(g) => {
                builder.add(g);
            }
            Err(e) => {
                tracing::warn!(glob = %expanded, error = %e, "invalid schema search glob");
            }
        }
    }
    builder
        .build()
        .inspect_err(|e| tracing::warn!(error = %e, "could not build schema search globs"))
        .ok()
}

/// Rewrites numbered group references `$N` as `${N}` so a following
/// letter, digit or underscore is kept as literal text.
fn brace_group_refs(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len());
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some(d) if d.is_ascii_digit() => {
                out.push_str("${");
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    out.push(d);
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push('$'),
        }
    }
    out
}

fn find_in_search_path(root: &Path, globs: &GlobSet) -> Option<PathBuf> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "error walking search path");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if globs.is_match(relative) {
            return Some(entry.path().to_path_buf());
        }
    }
    None
}

/// Local override first, network second.
pub struct OverrideFetch {
    local: LocalOverride,
    network: Arc<dyn Fetch>,
}

impl OverrideFetch {
    pub fn new(local: LocalOverride, network: Arc<dyn Fetch>) -> Self {
        Self { local, network }
    }
}

impl Fetch for OverrideFetch {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            // The search-path walk blocks; keep it off the worker's runtime thread.
            let local = self.local.clone();
            let owned = url.to_string();
            let found = tokio::task::spawn_blocking(move || local.lookup(&owned))
                .await
                .map_err(|e| FetchError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            if let Some(content) = found {
                return Ok(content.as_ref().clone());
            }
            self.network.fetch(url).await
        })
    }
}

type Job = (String, mpsc::SyncSender<Result<Vec<u8>, FetchError>>);

/// Runs fetches on a dedicated thread with its own runtime, so callers on
/// any thread can wait for a result with a deadline.
#[derive(Debug, Clone)]
pub struct FetchWorker {
    jobs: tokio::sync::mpsc::UnboundedSender<Job>,
    timeout: Duration,
}

impl FetchWorker {
    pub fn spawn(fetcher: Arc<dyn Fetch>) -> Result<Self, FetchError> {
        Self::with_timeout(fetcher, FETCH_TIMEOUT)
    }

    pub fn with_timeout(fetcher: Arc<dyn Fetch>, timeout: Duration) -> Result<Self, FetchError> {
        let (jobs, mut rx) = tokio::sync::mpsc::unbounded_channel::<Job>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FetchError::Worker(e.to_string()))?;

        std::thread::Builder::new()
            .name("jsls-fetch".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some((url, reply)) = rx.recv().await {
                        let fetcher = Arc::clone(&fetcher);
                        tokio::spawn(async move {
                            let result = fetcher.fetch(&url).await;
                            // The caller may have timed out and gone away.
                            let _ = reply.send(result);
                        });
                    }
                });
            })
            .map_err(|e| FetchError::Worker(e.to_string()))?;

        Ok(Self { jobs, timeout })
    }

    /// Fetch `url`, blocking the current thread until it completes or the
    /// timeout elapses.
    pub fn fetch_blocking(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let (reply, result) = mpsc::sync_channel(1);
        self.jobs
            .send((url.to_string(), reply))
            .map_err(|_| FetchError::WorkerGone)?;
        match result.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(url, timeout = ?self.timeout, "schema fetch timed out");
                Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(FetchError::WorkerGone),
        }
    }
}
