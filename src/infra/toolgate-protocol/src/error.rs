use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown execution status: {0}")]
    UnknownStatus(String),

    #[error("unknown approval action: {0}")]
    UnknownAction(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
