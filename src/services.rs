use std::sync::Arc;

use crate::analyze::Analyzer;
use crate::config::{Configuration, ConfigurationProvider};
use crate::fetch::{Fetch, FetchError, FetchWorker, LocalOverride, OverrideFetch};
use crate::file_cache::FileCache;
use crate::schema::SchemaProvider;

/// Process-wide services shared by every request handler.
///
/// The caches subscribe to configuration changes when they are created and
/// stay subscribed for as long as they live.
#[derive(Debug, Clone)]
pub struct Services {
    pub config: Arc<ConfigurationProvider>,
    pub file_cache: Arc<FileCache>,
    pub schemas: Arc<SchemaProvider>,
    pub analyzer: Analyzer,
}

impl Services {
    /// Wire the services around `network`, which is consulted after the
    /// local search paths.
    pub fn new(network: Arc<dyn Fetch>, initial: Configuration) -> Result<Self, FetchError> {
        let config = ConfigurationProvider::new(initial);
        let file_cache = FileCache::subscribed(&config);
        let local = LocalOverride::new(Arc::clone(&config), Arc::clone(&file_cache));
        let worker = FetchWorker::spawn(Arc::new(OverrideFetch::new(local, network)))?;
        let schemas = SchemaProvider::subscribed(worker, &config);
        let analyzer = Analyzer::new(Arc::clone(&schemas), Arc::clone(&config));
        Ok(Self {
            config,
            file_cache,
            schemas,
            analyzer,
        })
    }
}
