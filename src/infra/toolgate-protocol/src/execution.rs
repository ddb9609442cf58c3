use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Lifecycle status of a tool call.
///
/// Ordered `pending < approved < running < {completed, error, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Approved,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Position in the forward-only lifecycle. Terminal states share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Approved => 1,
            Self::Running => 2,
            Self::Completed | Self::Error | Self::Cancelled => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Whether the store may move a record from `self` to `next`.
    ///
    /// Same-status refreshes are allowed for non-terminal records;
    /// nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Cancelled {
            return matches!(self, Self::Pending | Self::Approved);
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ProtocolError::UnknownStatus(other.to_string())),
        }
    }
}

/// Durable record of one tool call's approval/execution lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tool_call_id: String,
    pub chat_id: String,
    pub message_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_params: Value,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Body of `POST /api/tool-executions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExecution {
    #[serde(default)]
    pub chat_id: String,
    /// Derived from `tool_call_id` by the gateway when empty.
    #[serde(default)]
    pub message_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_params: Value,
}

/// Status transition requested of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    #[serde(default)]
    pub tool_call_id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionUpdate {
    pub fn status(tool_call_id: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status,
            result: None,
            error_message: None,
        }
    }

    pub fn completed(tool_call_id: impl Into<String>, result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::status(tool_call_id, ExecutionStatus::Completed)
        }
    }

    pub fn failed(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::status(tool_call_id, ExecutionStatus::Error)
        }
    }
}
