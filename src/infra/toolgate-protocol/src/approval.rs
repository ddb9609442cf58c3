use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Error text the server uses when a command loses a race with another actor.
pub const ALREADY_PROCESSED: &str = "already processed";

/// User intent for a pending tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Cancel,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "cancel" => Ok(Self::Cancel),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

/// Body of `POST /api/tool-approval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalCommand {
    pub tool_call_id: String,
    pub action: ApprovalAction,
    pub session_id: String,
}

impl ApprovalCommand {
    pub fn new(
        tool_call_id: impl Into<String>,
        action: ApprovalAction,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            action,
            session_id: session_id.into(),
        }
    }
}

/// Diagnostic flags attached to a failed approval response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    #[serde(default)]
    pub is_timeout_error: bool,
    #[serde(default)]
    pub is_auth_error: bool,
    #[serde(default)]
    pub is_bad_request_error: bool,
    #[serde(default)]
    pub is_network_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_active_client: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_found: Option<bool>,
}

/// Reply to an [`ApprovalCommand`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

impl ApprovalResponse {
    pub fn success(tool_name: impl Into<String>, tool_result: Option<Value>) -> Self {
        Self {
            success: true,
            tool_result,
            tool_name: Some(tool_name.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>, debug_info: Option<DebugInfo>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            debug_info,
            ..Self::default()
        }
    }

    pub fn already_processed(tool_name: Option<String>) -> Self {
        Self {
            tool_name,
            ..Self::failure(ALREADY_PROCESSED, None)
        }
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Whether a concurrent actor already resolved the call.
    pub fn is_already_processed(&self) -> bool {
        !self.success
            && self
                .error
                .as_deref()
                .is_some_and(|e| e.to_ascii_lowercase().contains(ALREADY_PROCESSED))
    }
}
