//! Engine configuration.

use crate::debounce::DEFAULT_DEBOUNCE_DELAY;
use crate::echo::DEFAULT_ECHO_WINDOW;
use crate::remote::DEFAULT_BASE_URL;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::watch::DEFAULT_POLL_INTERVAL;
use crate::wire::DRAW_STREAM;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding [`SyncConfig::base_url`].
pub const ENV_URL: &str = "CANVAS_SYNC_URL";
/// Environment variable setting [`SyncConfig::push_url`].
pub const ENV_PUSH_URL: &str = "CANVAS_SYNC_PUSH_URL";
/// Environment variable setting [`SyncConfig::direction`].
pub const ENV_DIRECTION: &str = "CANVAS_SYNC_DIRECTION";
/// Environment variable setting [`SyncConfig::cache_dir`].
pub const ENV_CACHE_DIR: &str = "CANVAS_SYNC_CACHE_DIR";

/// Whether local edits travel to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Remote wins; local edits stay local.
    #[default]
    PullOnly,
    /// Debounced local writes and local clears are also sent to the remote.
    Bidirectional,
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pull_only" | "pull" => Ok(SyncDirection::PullOnly),
            "bidirectional" | "both" => Ok(SyncDirection::Bidirectional),
            other => Err(format!("unknown sync direction: {}", other)),
        }
    }
}

/// Configuration for the sync engine. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote canvas service.
    pub base_url: String,
    /// WebSocket event stream URL. Without it the remote is polled.
    pub push_url: Option<String>,
    /// Name of the draw notification stream.
    pub stream: String,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub echo_window_ms: u64,
    pub direction: SyncDirection,
    /// Cache directory. Defaults to the platform data dir, per origin.
    pub cache_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            push_url: None,
            stream: DRAW_STREAM.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            debounce_ms: DEFAULT_DEBOUNCE_DELAY.as_millis() as u64,
            echo_window_ms: DEFAULT_ECHO_WINDOW.as_millis() as u64,
            direction: SyncDirection::PullOnly,
            cache_dir: None,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by `CANVAS_SYNC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.is_empty()) {
            config.base_url = url;
        }
        if let Some(url) = lookup(ENV_PUSH_URL).filter(|v| !v.is_empty()) {
            config.push_url = Some(url);
        }
        if let Some(direction) = lookup(ENV_DIRECTION) {
            match direction.parse() {
                Ok(direction) => config.direction = direction,
                Err(e) => log::warn!("Ignoring {}: {}", ENV_DIRECTION, e),
            }
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }

    /// Origin the cache is namespaced by: the remote's scheme, host and port.
    pub fn origin(&self) -> String {
        match url::Url::parse(&self.base_url) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => self.base_url.clone(),
        }
    }

    /// Storage backend for the local cache.
    ///
    /// Falls back to memory when no data directory can be determined.
    pub fn create_storage(&self) -> Arc<dyn Storage> {
        if let Some(dir) = &self.cache_dir {
            return Arc::new(FileStorage::new(dir.clone()));
        }
        match FileStorage::default_location(&self.origin()) {
            Ok(storage) => Arc::new(storage),
            Err(e) => {
                log::warn!("{}, keeping canvas in memory only", e);
                Arc::new(MemoryStorage::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:31337");
        assert_eq!(config.stream, "excalidraw_draw");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.debounce_delay(), Duration::from_millis(300));
        assert_eq!(config.echo_window(), Duration::from_millis(100));
        assert_eq!(config.direction, SyncDirection::PullOnly);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            SyncConfig::from_json(r#"{"direction": "bidirectional", "debounce_ms": 50}"#).unwrap();
        assert_eq!(config.direction, SyncDirection::Bidirectional);
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_URL, "http://canvas.local:8080"),
            (ENV_PUSH_URL, "ws://canvas.local:8080/ws"),
            (ENV_DIRECTION, "bidirectional"),
            (ENV_CACHE_DIR, "/tmp/canvas"),
        ]
        .into_iter()
        .collect();
        let config = SyncConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.base_url, "http://canvas.local:8080");
        assert_eq!(config.push_url.as_deref(), Some("ws://canvas.local:8080/ws"));
        assert_eq!(config.direction, SyncDirection::Bidirectional);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/canvas")));
    }

    #[test]
    fn test_bad_direction_keeps_default() {
        let config =
            SyncConfig::from_lookup(|key| (key == ENV_DIRECTION).then(|| "sideways".to_string()));
        assert_eq!(config.direction, SyncDirection::PullOnly);
    }

    #[test]
    fn test_origin() {
        let config = SyncConfig {
            base_url: "http://127.0.0.1:31337/some/path".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(config.origin(), "http://127.0.0.1:31337");
    }
}
