use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::ClientConfig;
use crate::paths::display_cache_path;

use super::sqlite::now_unix;
use super::types::{DisplayKey, RenderMarker};
use super::{DisplayCache, RenderMarkers};

/// Client-side SQLite store for rendered tool results.
///
/// Holds both the rendering-time markers attached to messages and the
/// `(chat_id, tool_call_id)` display cache.
pub struct SqliteDisplayStore {
    conn: Mutex<Connection>,
}

impl SqliteDisplayStore {
    pub fn open(path: &Path) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("create display cache dir: {e}"))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open the configured cache, dropping entries past retention.
    pub fn from_config(config: &ClientConfig) -> Result<Self, String> {
        let path = match config.cache_path.clone() {
            Some(path) => path,
            None => display_cache_path()?,
        };
        let store = Self::open(&path)?;
        let pruned = store.prune_cached(config.cache_retention_days)?;
        if pruned > 0 {
            tracing::debug!(pruned, path = %path.display(), "pruned display cache");
        }
        Ok(store)
    }

    pub fn open_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory().map_err(|e| format!("sqlite open: {e}"))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS render_markers (
                message_id   TEXT NOT NULL,
                tool_call_id TEXT NOT NULL,
                text         TEXT NOT NULL,
                created_at   INTEGER NOT NULL,
                PRIMARY KEY (message_id, tool_call_id)
            );

            CREATE TABLE IF NOT EXISTS display_cache (
                chat_id      TEXT NOT NULL,
                tool_call_id TEXT NOT NULL,
                text         TEXT NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (chat_id, tool_call_id)
            );
            ",
        )
        .map_err(|e| format!("migrate: {e}"))?;
        Ok(())
    }
}

impl RenderMarkers for SqliteDisplayStore {
    fn marker(&self, message_id: &str, tool_call_id: &str) -> Result<Option<String>, String> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        conn.query_row(
            "SELECT text FROM render_markers WHERE message_id = ?1 AND tool_call_id = ?2",
            params![message_id, tool_call_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("get_marker: {e}"))
    }

    /// First capture wins; later attaches for the same call are ignored.
    fn attach_marker(&self, marker: &RenderMarker) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        conn.execute(
            "INSERT INTO render_markers (message_id, tool_call_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(message_id, tool_call_id) DO NOTHING",
            params![
                marker.message_id,
                marker.tool_call_id,
                marker.text,
                marker.created_at as i64,
            ],
        )
        .map_err(|e| format!("attach_marker: {e}"))?;
        Ok(())
    }
}

impl DisplayCache for SqliteDisplayStore {
    fn cached(&self, key: &DisplayKey) -> Result<Option<String>, String> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        conn.query_row(
            "SELECT text FROM display_cache WHERE chat_id = ?1 AND tool_call_id = ?2",
            params![key.chat_id, key.tool_call_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("get_cached: {e}"))
    }

    fn put_cached(&self, key: &DisplayKey, text: &str) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        conn.execute(
            "INSERT INTO display_cache (chat_id, tool_call_id, text, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id, tool_call_id) DO UPDATE SET
                text = excluded.text,
                updated_at = excluded.updated_at",
            params![key.chat_id, key.tool_call_id, text, now_unix() as i64],
        )
        .map_err(|e| format!("put_cached: {e}"))?;
        Ok(())
    }

    fn prune_cached(&self, retention_days: u64) -> Result<usize, String> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        let cutoff = now_unix().saturating_sub(retention_days.saturating_mul(86_400));
        conn.execute(
            "DELETE FROM display_cache WHERE updated_at < ?1",
            params![cutoff as i64],
        )
        .map_err(|e| format!("prune_cached: {e}"))
    }
}
