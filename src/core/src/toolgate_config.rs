use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::{ClientConfig, DEFAULT_CACHE_RETENTION_DAYS};
use crate::paths::{display_cache_path, resolve_path, toolgate_config_path};
use crate::sync::{SyncConfig, DEFAULT_POLL_CEILING, DEFAULT_POLL_INTERVAL};

/// User configuration read from `~/.toolgate/config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolgateConfig {
    pub version: u32,
    pub client: ClientSection,
    pub cache: CacheSection,
}

impl Default for ToolgateConfig {
    fn default() -> Self {
        Self {
            version: 1,
            client: ClientSection::default(),
            cache: CacheSection::default(),
        }
    }
}

impl ToolgateConfig {
    pub fn load() -> Result<Self, String> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| format!("read config.toml: {e}"))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("parse config.toml: {e}"))
    }

    pub fn config_path() -> Result<PathBuf, String> {
        toolgate_config_path()
    }

    /// Validated client settings.
    pub fn client_config(&self) -> Result<ClientConfig, String> {
        let base_url = normalize_base_url(&self.client.base_url)?;
        if self.client.poll_interval_ms == 0 {
            return Err("client.poll_interval_ms must be positive".to_string());
        }
        let cache_path = match self.cache.path.as_deref() {
            Some(path) => resolve_path(path)?,
            None => display_cache_path()?,
        };
        Ok(ClientConfig {
            base_url,
            request_timeout: Duration::from_secs(self.client.request_timeout_secs.max(1)),
            sync: SyncConfig {
                poll_interval: Duration::from_millis(self.client.poll_interval_ms),
                poll_ceiling: Duration::from_secs(self.client.poll_ceiling_secs),
            },
            cache_path: Some(cache_path),
            cache_retention_days: self.cache.retention_days,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_ceiling_secs: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9810".to_string(),
            request_timeout_secs: 30,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            poll_ceiling_secs: DEFAULT_POLL_CEILING.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub path: Option<String>,
    pub retention_days: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: None,
            retention_days: DEFAULT_CACHE_RETENTION_DAYS,
        }
    }
}

/// Parse a gateway base URL; only http(s) is accepted and the trailing slash is dropped.
pub fn normalize_base_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("invalid base_url {raw:?}: {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("base_url must be http or https, got {other}")),
    }
    if url.host_str().is_none() {
        return Err(format!("base_url {raw:?} has no host"));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
