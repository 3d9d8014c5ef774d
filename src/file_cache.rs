//! In-memory cache of schema files served from local search paths.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use crate::config::{Configuration, ConfigurationObserver, ConfigurationProvider, Subscription};

#[derive(Debug, Clone)]
struct FileEntry {
    path: PathBuf,
    modified: SystemTime,
    len: u64,
    content: Arc<Vec<u8>>,
}

/// Schema bodies read from disk, keyed by the URL they were served for.
///
/// An entry is only returned while its backing file exists and has not been
/// modified since it was read.
#[derive(Debug, Default)]
pub struct FileCache {
    entries: Mutex<HashMap<String, FileEntry>>,
    _subscription: Option<Subscription>,
}

fn cache_key(url: &str) -> String {
    url.to_ascii_lowercase()
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that empties itself whenever the configuration changes.
    pub fn subscribed(config: &Arc<ConfigurationProvider>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let observer: Weak<dyn ConfigurationObserver> = weak.clone();
            Self {
                entries: Mutex::default(),
                _subscription: Some(config.subscribe(observer)),
            }
        })
    }

    /// Remember `content` as the body of `url`, read from `path`.
    pub fn add(&self, url: &str, path: &Path, content: Vec<u8>) -> std::io::Result<Arc<Vec<u8>>> {
        let path = fs::canonicalize(path)?;
        let meta = fs::metadata(&path)?;
        let content = Arc::new(content);
        let entry = FileEntry {
            modified: meta.modified()?,
            len: meta.len(),
            path,
            content: content.clone(),
        };
        tracing::debug!(url, path = %entry.path.display(), "cached schema file");
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key(url), entry);
        Ok(content)
    }

    /// Cached body for `url`, if its file is unchanged. Stale entries are evicted.
    pub fn try_get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        let key = cache_key(url);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(&key)?;
        let fresh = match fs::metadata(&entry.path) {
            Ok(meta) => {
                meta.len() == entry.len
                    && meta.modified().is_ok_and(|modified| modified <= entry.modified)
            }
            Err(_) => false,
        };
        if fresh {
            return Some(entry.content.clone());
        }
        tracing::debug!(url, path = %entry.path.display(), "evicting stale schema file");
        entries.remove(&key);
        None
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Normalized URLs currently cached, sorted.
    pub fn cached_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        urls.sort();
        urls
    }
}

impl ConfigurationObserver for FileCache {
    fn on_configuration_changed(&self, _old: &Configuration, _new: &Configuration) {
        tracing::debug!(entries = self.len(), "configuration changed, clearing file cache");
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const URL: &str = "https://example.com/Schema.json";

    #[test]
    fn test_add_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, b"{}").unwrap();

        let cache = FileCache::new();
        cache.add(URL, &path, b"{}".to_vec()).unwrap();
        assert_eq!(cache.try_get(URL).unwrap().as_slice(), b"{}");
        // Keys are case-insensitive.
        assert!(cache.try_get(&URL.to_uppercase()).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_append_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, b"{}").unwrap();

        let cache = FileCache::new();
        cache.add(URL, &path, b"{}".to_vec()).unwrap();

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b" ").unwrap();
        drop(file);

        assert!(cache.try_get(URL).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_deleted_file_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, b"{}").unwrap();

        let cache = FileCache::new();
        cache.add(URL, &path, b"{}".to_vec()).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(cache.try_get(URL).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_url() {
        let cache = FileCache::new();
        assert!(cache.try_get(URL).is_none());
    }

    #[test]
    fn test_configuration_change_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, b"{}").unwrap();

        let provider = ConfigurationProvider::new(Configuration::default());
        let cache = FileCache::subscribed(&provider);
        cache.add(URL, &path, b"{}".to_vec()).unwrap();
        assert_eq!(cache.cached_urls(), vec![URL.to_ascii_lowercase()]);

        // Same value: nothing happens.
        provider.update(Configuration::default());
        assert_eq!(cache.len(), 1);

        provider.update(Configuration {
            schema_search_paths: vec![dir.path().display().to_string()],
            ..Default::default()
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let provider = ConfigurationProvider::new(Configuration::default());
        let cache = FileCache::subscribed(&provider);
        assert_eq!(provider.observer_count(), 1);
        drop(cache);
        assert_eq!(provider.observer_count(), 0);
    }
}
