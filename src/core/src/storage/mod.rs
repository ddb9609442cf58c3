mod display;
mod sqlite;
mod types;

pub use display::SqliteDisplayStore;
pub use sqlite::SqliteStore;
pub use types::{DisplayKey, RenderMarker};

use futures::future::BoxFuture;
use thiserror::Error;
use toolgate_protocol::{ExecutionRecord, ExecutionStatus, ExecutionUpdate, NewExecution};

use crate::approval::TransportError;

/// Failures surfaced by an [`ExecutionStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tool call not found: {0}")]
    NotFound(String),

    /// Another actor already moved the record to a terminal state.
    #[error("tool call already processed ({status})")]
    AlreadyProcessed { status: ExecutionStatus },

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("store backend: {0}")]
    Backend(String),
}

impl From<String> for StoreError {
    fn from(message: String) -> Self {
        StoreError::Backend(message)
    }
}

/// Durable keyed records of tool-call lifecycle.
///
/// Every call is a round trip to the authoritative store, so the methods
/// return boxed futures. `create` is idempotent per `tool_call_id`.
pub trait ExecutionStore: Send + Sync + 'static {
    /// Read a record by tool call id.
    fn get<'a>(
        &'a self,
        tool_call_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ExecutionRecord>, StoreError>>;

    /// Create a pending record, or return the existing one unchanged.
    fn create<'a>(
        &'a self,
        new: &'a NewExecution,
    ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>>;

    /// Apply a status transition.
    fn update<'a>(
        &'a self,
        update: &'a ExecutionUpdate,
    ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>>;

    /// All records of a chat, oldest first.
    fn list_for_chat<'a>(
        &'a self,
        chat_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ExecutionRecord>, StoreError>>;
}

/// Text captured on the owning message the first time a result was shown.
pub trait RenderMarkers: Send + Sync + 'static {
    fn marker(&self, message_id: &str, tool_call_id: &str) -> Result<Option<String>, String>;

    fn attach_marker(&self, marker: &RenderMarker) -> Result<(), String>;
}

/// Client-side durable cache of formatted results.
pub trait DisplayCache: Send + Sync + 'static {
    fn cached(&self, key: &DisplayKey) -> Result<Option<String>, String>;

    fn put_cached(&self, key: &DisplayKey, text: &str) -> Result<(), String>;

    /// Remove entries older than the retention window.
    fn prune_cached(&self, retention_days: u64) -> Result<usize, String>;
}
