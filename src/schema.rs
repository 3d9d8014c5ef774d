use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use thiserror::Error;

use crate::config::{Configuration, ConfigurationObserver, ConfigurationProvider, Subscription};
use crate::fetch::{FetchError, FetchWorker};
use crate::parse;

/// The meta-schema loaded before any document is validated.
pub const META_SCHEMA_URL: &str = "https://json-schema.org/draft/2020-12/schema";

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Failed to fetch schema from '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("Failed to parse schema from '{url}': {reason}")]
    Parse { url: String, reason: String },
    #[error("Failed to compile schema '{url}': {reason}")]
    Compile { url: String, reason: String },
}

/// Routes `$ref` retrieval through the fetch worker, so references get the
/// same local overrides and timeout as top-level schemas.
struct WorkerRetriever {
    worker: FetchWorker,
}

impl jsonschema::Retrieve for WorkerRetriever {
    fn retrieve(
        &self,
        uri: &jsonschema::Uri<String>,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>> {
        let bytes = self.worker.fetch_blocking(uri.as_str())?;
        Ok(parse::parse_schema_bytes(&bytes)?)
    }
}

/// Cache key: ASCII case-insensitive, without an empty trailing fragment.
fn normalize_url(url: &str) -> String {
    url.strip_suffix('#').unwrap_or(url).to_ascii_lowercase()
}

/// Compiled schemas keyed by URL.
///
/// Entries are never replaced once inserted; they only go away through
/// [`SchemaProvider::clear`], which keeps the preloaded meta-schema.
pub struct SchemaProvider {
    worker: FetchWorker,
    schemas: RwLock<HashMap<String, Arc<jsonschema::Validator>>>,
    _subscription: Option<Subscription>,
}

impl std::fmt::Debug for SchemaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaProvider")
            .field("cached", &self.cached_urls())
            .finish()
    }
}

impl SchemaProvider {
    pub fn new(worker: FetchWorker) -> Self {
        Self {
            worker,
            schemas: RwLock::default(),
            _subscription: None,
        }
    }

    /// Create a provider that drops its compiled schemas whenever the
    /// configuration changes, so new search paths take effect.
    pub fn subscribed(worker: FetchWorker, config: &Arc<ConfigurationProvider>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let observer: Weak<dyn ConfigurationObserver> = weak.clone();
            Self {
                worker,
                schemas: RwLock::default(),
                _subscription: Some(config.subscribe(observer)),
            }
        })
    }

    /// Load and compile the meta-schema. The server must not start without it.
    pub fn initialize(&self) -> Result<(), SchemaError> {
        let validator = self.load(META_SCHEMA_URL)?;
        self.insert(META_SCHEMA_URL, validator);
        tracing::info!(url = META_SCHEMA_URL, "meta-schema loaded");
        Ok(())
    }

    /// Compiled schema for `url`, fetching and compiling it on a cache miss.
    pub fn resolve(&self, url: &str) -> Result<Arc<jsonschema::Validator>, SchemaError> {
        let key = normalize_url(url);
        if let Some(v) = self
            .schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            tracing::debug!(url, "schema cache hit");
            return Ok(Arc::clone(v));
        }
        tracing::debug!(url, "schema cache miss");
        let validator = self.load(url)?;
        Ok(self.insert(url, validator))
    }

    pub fn try_get_schema(&self, url: &str) -> Option<Arc<jsonschema::Validator>> {
        self.resolve(url)
            .inspect_err(|e| tracing::warn!(error = %e, "could not resolve schema"))
            .ok()
    }

    fn load(&self, url: &str) -> Result<Arc<jsonschema::Validator>, SchemaError> {
        let bytes = self
            .worker
            .fetch_blocking(url)
            .map_err(|source| SchemaError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let value = parse::parse_schema_bytes(&bytes).map_err(|e| SchemaError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let validator = jsonschema::options()
            .with_retriever(WorkerRetriever {
                worker: self.worker.clone(),
            })
            .build(&value)
            .map_err(|e| SchemaError::Compile {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(validator))
    }

    /// Insert unless another caller got there first; the first entry wins.
    fn insert(
        &self,
        url: &str,
        validator: Arc<jsonschema::Validator>,
    ) -> Arc<jsonschema::Validator> {
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(schemas.entry(normalize_url(url)).or_insert(validator))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&normalize_url(url))
    }

    pub fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalized URLs currently cached, sorted.
    pub fn cached_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        urls.sort();
        urls
    }

    /// Drop every compiled schema except the meta-schema.
    pub fn clear(&self) {
        let meta = normalize_url(META_SCHEMA_URL);
        self.schemas
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|url, _| *url == meta);
    }
}

impl ConfigurationObserver for SchemaProvider {
    fn on_configuration_changed(&self, _old: &Configuration, _new: &Configuration) {
        tracing::debug!(entries = self.len(), "configuration changed, clearing schema cache");
        self.clear();
    }
}
