use std::env;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use toolgate_core::{
    build_router, executions_db_path, DisconnectedExecutor, ExecutionStore, HttpToolExecutor,
    ServerConfig, SqliteStore, ToolExecutor,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_filter())
        .init();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        bind: parse_socket("TOOLGATE_BIND", defaults.bind),
        db_path: db_path_from(env::var_os("TOOLGATE_DB_PATH"))?,
        executor_url: env::var("TOOLGATE_EXECUTOR_URL")
            .ok()
            .filter(|v| !v.trim().is_empty()),
        executor_timeout: parse_duration(
            "TOOLGATE_EXECUTOR_TIMEOUT_SECS",
            defaults.executor_timeout,
        ),
    };

    let store: Arc<dyn ExecutionStore> = match config.db_path.as_deref() {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening execution store");
            Arc::new(SqliteStore::open(path)?)
        }
        None => {
            tracing::warn!("TOOLGATE_DB_PATH is empty; execution records are kept in memory");
            Arc::new(SqliteStore::open_memory()?)
        }
    };

    let executor: Arc<dyn ToolExecutor> = match config.executor_url.as_deref() {
        Some(url) => {
            tracing::info!(%url, "forwarding approved tools to executor");
            Arc::new(HttpToolExecutor::new(url, config.executor_timeout)?)
        }
        None => {
            tracing::warn!("TOOLGATE_EXECUTOR_URL not set; approvals will report no active client");
            Arc::new(DisconnectedExecutor)
        }
    };

    let app = build_router(store, executor);

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Unset means the default file under the toolgate home; empty means in-memory.
fn db_path_from(raw: Option<OsString>) -> Result<Option<PathBuf>, String> {
    match raw {
        Some(path) if path.is_empty() => Ok(None),
        Some(path) => Ok(Some(PathBuf::from(path))),
        None => executions_db_path().map(Some),
    }
}

fn parse_socket(key: &str, default: SocketAddr) -> SocketAddr {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_duration(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map(Duration::from_secs).unwrap_or(default),
        Err(_) => default,
    }
}

fn tracing_filter() -> tracing_subscriber::EnvFilter {
    let explicit = env::var("TOOLGATE_LOG").or_else(|_| env::var("RUST_LOG")).ok();
    if let Some(filter) = explicit {
        return tracing_subscriber::EnvFilter::new(filter);
    }
    if matches!(
        env::var("TOOLGATE_DEBUG").as_deref(),
        Ok("1" | "true" | "TRUE" | "yes" | "YES")
    ) {
        return tracing_subscriber::EnvFilter::new("debug");
    }
    tracing_subscriber::EnvFilter::new("info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_db_path_selects_memory_store() {
        assert_eq!(db_path_from(Some(OsString::new())).unwrap(), None);
    }

    #[test]
    fn explicit_db_path_is_kept() {
        assert_eq!(
            db_path_from(Some(OsString::from("/var/lib/toolgate/executions.db"))).unwrap(),
            Some(PathBuf::from("/var/lib/toolgate/executions.db"))
        );
    }
}
