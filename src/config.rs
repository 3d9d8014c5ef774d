//! Server configuration and change notification.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings must be a JSON object")]
    NotAnObject,
    #[error("invalid settings: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Settings payload sent by the client in `workspace/didChangeConfiguration`.
///
/// Keys are matched case-insensitively. List values are comma-separated
/// strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Maximum number of diagnostics published per document. Negative or
    /// absent means unlimited.
    #[serde(default)]
    pub max_number_of_problems: Option<i64>,

    /// Comma-separated directories searched for local copies of schemas.
    #[serde(default)]
    pub schema_search_paths: Option<String>,

    /// Comma-separated globs matched against files under the search paths.
    /// `$1`-style references are replaced with groups captured by
    /// `schemaSearchUrlPattern`.
    #[serde(default)]
    pub schema_search_globs: Option<String>,

    /// Regular expression a schema URL must match to be looked up locally.
    #[serde(default)]
    pub schema_search_url_pattern: Option<String>,
}

const SETTING_KEYS: [&str; 4] = [
    "maxNumberOfProblems",
    "schemaSearchPaths",
    "schemaSearchGlobs",
    "schemaSearchUrlPattern",
];

impl Settings {
    /// Deserialize a settings payload.
    ///
    /// The payload may be the settings object itself or an object holding a
    /// single section (e.g. `{"jsonSchemaLanguageServer": {...}}`).
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let obj = value.as_object().ok_or(ConfigError::NotAnObject)?;
        let has_known_key = obj.keys().any(|k| canonical_key(k).is_some());
        if !has_known_key
            && obj.len() == 1
            && let Some(section) = obj.values().next()
            && section.is_object()
        {
            return Self::from_value(section);
        }

        let normalized: serde_json::Map<String, serde_json::Value> = obj
            .iter()
            .filter_map(|(k, v)| canonical_key(k).map(|key| (key.to_string(), v.clone())))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(normalized))?)
    }
}

fn canonical_key(key: &str) -> Option<&'static str> {
    SETTING_KEYS
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(key))
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The effective configuration. Compared structurally to detect changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    pub max_number_of_problems: Option<usize>,
    pub schema_search_paths: Vec<String>,
    pub schema_search_globs: Vec<String>,
    pub schema_search_url_pattern: Option<String>,
}

impl From<Settings> for Configuration {
    fn from(settings: Settings) -> Self {
        Self {
            max_number_of_problems: settings
                .max_number_of_problems
                .and_then(|n| usize::try_from(n).ok()),
            schema_search_paths: split_list(settings.schema_search_paths.as_deref()),
            schema_search_globs: split_list(settings.schema_search_globs.as_deref()),
            schema_search_url_pattern: settings
                .schema_search_url_pattern
                .filter(|p| !p.trim().is_empty()),
        }
    }
}

impl Configuration {
    pub fn from_settings(value: &serde_json::Value) -> Result<Self, ConfigError> {
        Settings::from_value(value).map(Self::from)
    }

    /// Truncate `items` to the configured maximum, keeping the first ones.
    pub fn clip<T>(&self, items: &mut Vec<T>) {
        if let Some(max) = self.max_number_of_problems {
            items.truncate(max);
        }
    }

    /// Compiled local lookup options, if lookup is fully configured.
    ///
    /// Returns `None` when paths, globs or the URL pattern are missing, or when
    /// the pattern is not a valid regular expression.
    pub fn search_options(&self) -> Option<SearchOptions> {
        if self.schema_search_paths.is_empty() || self.schema_search_globs.is_empty() {
            return None;
        }
        let pattern = self.schema_search_url_pattern.as_deref()?;
        let url_pattern = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid schema search URL pattern");
                return None;
            }
        };
        Some(SearchOptions {
            paths: self.schema_search_paths.iter().map(PathBuf::from).collect(),
            globs: self.schema_search_globs.clone(),
            url_pattern,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub paths: Vec<PathBuf>,
    pub globs: Vec<String>,
    pub url_pattern: Regex,
}

/// Receives configuration changes.
pub trait ConfigurationObserver: Send + Sync {
    fn on_configuration_changed(&self, old: &Configuration, new: &Configuration);
}

/// Holds the current configuration and notifies observers when it changes.
#[derive(Default)]
pub struct ConfigurationProvider {
    current: RwLock<Arc<Configuration>>,
    observers: Mutex<Vec<(u64, Weak<dyn ConfigurationObserver>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ConfigurationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationProvider")
            .field("current", &self.current())
            .finish()
    }
}

impl ConfigurationProvider {
    pub fn new(initial: Configuration) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(initial)),
            ..Default::default()
        })
    }

    pub fn current(&self) -> Arc<Configuration> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the configuration if it differs from the current one.
    ///
    /// Observers are notified before this returns. Returns whether the value
    /// changed.
    pub fn update(&self, new: Configuration) -> bool {
        let (old, new) = {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            if **current == new {
                return false;
            }
            let new = Arc::new(new);
            (std::mem::replace(&mut *current, new.clone()), new)
        };
        tracing::info!(?new, "configuration changed");

        let observers: Vec<Arc<dyn ConfigurationObserver>> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|(_, o)| o.upgrade())
            .collect();
        for observer in observers {
            observer.on_configuration_changed(&old, &new);
        }
        true
    }

    /// Register an observer. It stays registered until the returned
    /// subscription is dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        observer: Weak<dyn ConfigurationObserver>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, observer));
        Subscription {
            provider: Arc::downgrade(self),
            id,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Unsubscribes its observer when dropped.
#[derive(Debug)]
pub struct Subscription {
    provider: Weak<ConfigurationProvider>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.upgrade() {
            provider
                .observers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}
