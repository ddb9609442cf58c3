use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::SyncConfig;

pub const DEFAULT_CACHE_RETENTION_DAYS: u64 = 30;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1:9810).
    pub bind: SocketAddr,
    /// Execution store location; `None` keeps records in memory.
    pub db_path: Option<PathBuf>,
    /// Tool executor endpoint. Without one, approvals report no active client.
    pub executor_url: Option<String>,
    /// Per-call deadline for the tool executor.
    pub executor_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9810),
            db_path: None,
            executor_url: None,
            executor_timeout: Duration::from_secs(30),
        }
    }
}

/// Client-side configuration for talking to a gateway.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-request HTTP deadline; expiry is classified as a timeout.
    pub request_timeout: Duration,
    pub sync: SyncConfig,
    /// Display cache location; `None` resolves under the toolgate home.
    pub cache_path: Option<PathBuf>,
    pub cache_retention_days: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9810".to_string(),
            request_timeout: Duration::from_secs(30),
            sync: SyncConfig::default(),
            cache_path: None,
            cache_retention_days: DEFAULT_CACHE_RETENTION_DAYS,
        }
    }
}
