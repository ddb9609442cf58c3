use std::path::Path;
use std::sync::Mutex;

use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use toolgate_protocol::{ExecutionRecord, ExecutionStatus, ExecutionUpdate, NewExecution};

use super::{ExecutionStore, StoreError};

const RECORD_COLUMNS: &str = "tool_call_id, chat_id, message_id, tool_name, tool_params, status,
     result_json, error_message, created_at, updated_at";

/// SQLite-backed authoritative store for tool-call execution records.
///
/// Uses a `Mutex<Connection>` for thread-safe interior mutability, so every
/// transition is checked and written under one lock. The database is
/// created/migrated on `open()`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a sqlite database at the given path.
    pub fn open(path: &Path) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("create database dir: {e}"))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (useful for tests).
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
            CREATE TABLE IF NOT EXISTS tool_executions (
                tool_call_id  TEXT PRIMARY KEY,
                chat_id       TEXT NOT NULL,
                message_id    TEXT NOT NULL,
                tool_name     TEXT NOT NULL,
                tool_params   TEXT NOT NULL DEFAULT '{}',
                status        TEXT NOT NULL DEFAULT 'pending',
                result_json   TEXT,
                error_message TEXT,
                created_at    INTEGER NOT NULL,
                updated_at    INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tool_executions_chat
                ON tool_executions (chat_id, created_at);
            ",
        )
        .map_err(|e| format!("migrate: {e}"))?;

        Ok(())
    }

    fn get_record(&self, tool_call_id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        read_record(&conn, tool_call_id).map_err(StoreError::Backend)
    }

    fn create_record(&self, new: &NewExecution) -> Result<ExecutionRecord, StoreError> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        let now = now_unix();
        let params_json = serde_json::to_string(&new.tool_params)
            .map_err(|e| format!("serialize tool_params: {e}"))?;
        let inserted = conn
            .execute(
                "INSERT INTO tool_executions
                    (tool_call_id, chat_id, message_id, tool_name, tool_params, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)
                 ON CONFLICT(tool_call_id) DO NOTHING",
                params![
                    new.tool_call_id,
                    new.chat_id,
                    new.message_id,
                    new.tool_name,
                    params_json,
                    now as i64,
                ],
            )
            .map_err(|e| format!("create_execution: {e}"))?;
        if inserted == 0 {
            tracing::debug!(tool_call_id = %new.tool_call_id, "execution record already exists");
        }

        read_record(&conn, &new.tool_call_id)
            .map_err(StoreError::Backend)?
            .ok_or_else(|| StoreError::Backend(format!("record vanished: {}", new.tool_call_id)))
    }

    fn update_record(&self, update: &ExecutionUpdate) -> Result<ExecutionRecord, StoreError> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        let current = read_record(&conn, &update.tool_call_id)
            .map_err(StoreError::Backend)?
            .ok_or_else(|| StoreError::NotFound(update.tool_call_id.clone()))?;

        if !current.status.can_transition_to(update.status) {
            if current.status.is_terminal() || update.status == ExecutionStatus::Cancelled {
                return Err(StoreError::AlreadyProcessed {
                    status: current.status,
                });
            }
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to: update.status,
            });
        }

        let result_json = update
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| format!("serialize result: {e}"))?;
        conn.execute(
            "UPDATE tool_executions SET
                status = ?2,
                result_json = COALESCE(?3, result_json),
                error_message = COALESCE(?4, error_message),
                updated_at = ?5
             WHERE tool_call_id = ?1",
            params![
                update.tool_call_id,
                update.status.as_str(),
                result_json,
                update.error_message,
                now_unix() as i64,
            ],
        )
        .map_err(|e| format!("update_execution: {e}"))?;

        tracing::debug!(
            tool_call_id = %update.tool_call_id,
            from = %current.status,
            to = %update.status,
            "execution status updated"
        );

        read_record(&conn, &update.tool_call_id)
            .map_err(StoreError::Backend)?
            .ok_or_else(|| StoreError::NotFound(update.tool_call_id.clone()))
    }

    fn list_records(&self, chat_id: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|e| format!("lock: {e}"))?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM tool_executions
                 WHERE chat_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ))
            .map_err(|e| format!("list_executions prepare: {e}"))?;

        let rows = stmt
            .query_map(params![chat_id], record_from_row)
            .map_err(|e| format!("list_executions query: {e}"))?;

        let records = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("list_executions row: {e}"))?;
        Ok(records)
    }
}

impl ExecutionStore for SqliteStore {
    fn get<'a>(
        &'a self,
        tool_call_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ExecutionRecord>, StoreError>> {
        Box::pin(async move { self.get_record(tool_call_id) })
    }

    fn create<'a>(
        &'a self,
        new: &'a NewExecution,
    ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>> {
        Box::pin(async move { self.create_record(new) })
    }

    fn update<'a>(
        &'a self,
        update: &'a ExecutionUpdate,
    ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>> {
        Box::pin(async move { self.update_record(update) })
    }

    fn list_for_chat<'a>(
        &'a self,
        chat_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ExecutionRecord>, StoreError>> {
        Box::pin(async move { self.list_records(chat_id) })
    }
}

fn read_record(conn: &Connection, tool_call_id: &str) -> Result<Option<ExecutionRecord>, String> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM tool_executions WHERE tool_call_id = ?1"),
        params![tool_call_id],
        record_from_row,
    )
    .optional()
    .map_err(|e| format!("get_execution: {e}"))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let status_label: String = row.get(5)?;
    let status = status_label.parse::<ExecutionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let params_json: String = row.get(4)?;
    let result_json: Option<String> = row.get(6)?;
    Ok(ExecutionRecord {
        tool_call_id: row.get(0)?,
        chat_id: row.get(1)?,
        message_id: row.get(2)?,
        tool_name: row.get(3)?,
        tool_params: serde_json::from_str(&params_json).unwrap_or(Value::Null),
        status,
        result: result_json.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        }),
        error_message: row.get(7)?,
        created_at: row.get::<_, i64>(8)? as u64,
        updated_at: row.get::<_, i64>(9)? as u64,
    })
}

pub(crate) fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::ids::message_id_for;

    fn make_store() -> SqliteStore {
        SqliteStore::open_memory().unwrap()
    }

    fn new_execution(tool_call_id: &str) -> NewExecution {
        NewExecution {
            chat_id: "5e0b7c1a-2f33-4d4b-9e51-0a8c3f6d2b10".into(),
            message_id: message_id_for(tool_call_id),
            tool_call_id: tool_call_id.into(),
            tool_name: "gmail_send_email".into(),
            tool_params: json!({"to": "", "subject": "", "body": ""}),
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = make_store();
        let created = store.create(&new_execution("abc123")).await.unwrap();
        assert_eq!(created.status, ExecutionStatus::Pending);
        assert_eq!(created.tool_params["to"], json!(""));

        let loaded = store.get("abc123").await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = make_store();
        let first = store.create(&new_execution("abc123")).await.unwrap();
        store
            .update(&ExecutionUpdate::status("abc123", ExecutionStatus::Approved))
            .await
            .unwrap();

        let mut again = new_execution("abc123");
        again.tool_params = json!({"to": "someone@example.com"});
        let second = store.create(&again).await.unwrap();
        assert_eq!(second.message_id, first.message_id);
        assert_eq!(second.status, ExecutionStatus::Approved);
        assert_eq!(second.tool_params, first.tool_params);
    }

    #[tokio::test]
    async fn concurrent_creates_converge_on_one_row() {
        let store = Arc::new(make_store());
        let new = new_execution("abc123");
        let (a, b) = tokio::join!(store.create(&new), store.create(&new));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.message_id, b.message_id);
        assert_eq!(a.created_at, b.created_at);

        let rows = store
            .list_for_chat("5e0b7c1a-2f33-4d4b-9e51-0a8c3f6d2b10")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn forward_transitions_store_result() {
        let store = make_store();
        store.create(&new_execution("abc123")).await.unwrap();
        for status in [ExecutionStatus::Approved, ExecutionStatus::Running] {
            store
                .update(&ExecutionUpdate::status("abc123", status))
                .await
                .unwrap();
        }
        let done = store
            .update(&ExecutionUpdate::completed("abc123", json!({"id": "msg-1"})))
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.result, Some(json!({"id": "msg-1"})));
    }

    #[tokio::test]
    async fn terminal_records_reject_cancel_as_already_processed() {
        let store = make_store();
        store.create(&new_execution("abc123")).await.unwrap();
        store
            .update(&ExecutionUpdate::completed("abc123", json!("sent")))
            .await
            .unwrap();

        let err = store
            .update(&ExecutionUpdate::status("abc123", ExecutionStatus::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::AlreadyProcessed {
                status: ExecutionStatus::Completed
            }
        ));
    }

    #[tokio::test]
    async fn cancel_after_running_is_rejected() {
        let store = make_store();
        store.create(&new_execution("abc123")).await.unwrap();
        store
            .update(&ExecutionUpdate::status("abc123", ExecutionStatus::Running))
            .await
            .unwrap();
        let err = store
            .update(&ExecutionUpdate::status("abc123", ExecutionStatus::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyProcessed { .. }));
    }

    #[tokio::test]
    async fn backwards_transition_is_invalid() {
        let store = make_store();
        store.create(&new_execution("abc123")).await.unwrap();
        store
            .update(&ExecutionUpdate::status("abc123", ExecutionStatus::Running))
            .await
            .unwrap();
        let err = store
            .update(&ExecutionUpdate::status("abc123", ExecutionStatus::Approved))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn update_unknown_record_is_not_found() {
        let store = make_store();
        let err = store
            .update(&ExecutionUpdate::status("nope", ExecutionStatus::Approved))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn error_message_is_kept() {
        let store = make_store();
        store.create(&new_execution("abc123")).await.unwrap();
        let failed = store
            .update(&ExecutionUpdate::failed("abc123", "quota exceeded"))
            .await
            .unwrap();
        assert_eq!(failed.status, ExecutionStatus::Error);
        assert_eq!(failed.error_message.as_deref(), Some("quota exceeded"));
    }
}
