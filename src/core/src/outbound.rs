use serde::Serialize;
use toolgate_protocol::ExecutionStatus;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Error,
}

/// Human-readable message surfaced next to a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Messages emitted by call contexts to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewEvent {
    StatusChanged {
        tool_call_id: String,
        status: ExecutionStatus,
    },
    Notice {
        tool_call_id: String,
        notice: Notice,
    },
    ResultReady {
        tool_call_id: String,
        text: String,
    },
}

impl ViewEvent {
    pub fn status(tool_call_id: impl Into<String>, status: ExecutionStatus) -> Self {
        Self::StatusChanged {
            tool_call_id: tool_call_id.into(),
            status,
        }
    }

    pub fn notice(tool_call_id: impl Into<String>, notice: Notice) -> Self {
        Self::Notice {
            tool_call_id: tool_call_id.into(),
            notice,
        }
    }

    pub fn result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::ResultReady {
            tool_call_id: tool_call_id.into(),
            text: text.into(),
        }
    }
}
