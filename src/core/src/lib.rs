mod client;
mod config;
mod outbound;
mod paths;
mod recovery;
mod server;
mod toolgate_config;

pub mod approval;
pub mod family;
pub mod format;
pub mod ids;
pub mod marker;
pub mod service;
pub mod storage;
pub mod sync;

pub use approval::{
    ApprovalController, ApprovalError, ApprovalOutcome, ApprovalTransport, CallContext,
    TransportError, TransportErrorKind,
};
pub use client::HttpGateway;
pub use config::{ClientConfig, ServerConfig};
pub use format::{ResultFormatter, ToolPayload};
pub use marker::{parse_message, MarkerScanner, ParsedMessage, ToolCallRequest};
pub use outbound::{Notice, NoticeLevel, ViewEvent};
pub use paths::{display_cache_path, executions_db_path, toolgate_home_dir};
pub use recovery::{Recovered, RecoveryChain, RecoveryTier};
pub use server::{approval_status, build_router, ErrorBody};
pub use service::{ApprovalService, DisconnectedExecutor, HttpToolExecutor, ToolExecutor};
pub use storage::{
    DisplayCache, DisplayKey, ExecutionStore, RenderMarkers, SqliteDisplayStore, SqliteStore,
    StoreError,
};
pub use sync::{PollingFeed, StateSynchronizer, StatusFeed, SyncConfig};
pub use toolgate_config::ToolgateConfig;
