use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolgate_protocol::{ApprovalResponse, DebugInfo};

use crate::storage::StoreError;

/// Why an approval command failed to reach or be accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Auth,
    BadRequest,
    NetworkUnreachable,
    NoActiveClient,
    ToolNotFound,
    Unknown,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::BadRequest => "bad_request",
            Self::NetworkUnreachable => "network_unreachable",
            Self::NoActiveClient => "no_active_client",
            Self::ToolNotFound => "tool_not_found",
            Self::Unknown => "unknown",
        }
    }

    /// Notice text shown to the user for this kind of failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "The tool took too long to respond. Please try again.",
            Self::Auth => "Your session is not authorized to run this tool. Sign in again and retry.",
            Self::BadRequest => "The approval request was rejected as invalid.",
            Self::NetworkUnreachable => {
                "Could not reach the tool server. Check your connection and try again."
            }
            Self::NoActiveClient => "No tool client is connected for this session.",
            Self::ToolNotFound => "This tool is no longer available.",
            Self::Unknown => "Something went wrong while processing the approval.",
        }
    }

    /// First matching diagnostic flag, in precedence order.
    pub fn from_debug_info(info: &DebugInfo) -> Option<Self> {
        if info.is_timeout_error {
            Some(Self::Timeout)
        } else if info.is_auth_error {
            Some(Self::Auth)
        } else if info.is_bad_request_error {
            Some(Self::BadRequest)
        } else if info.is_network_error {
            Some(Self::NetworkUnreachable)
        } else if info.has_active_client == Some(false) {
            Some(Self::NoActiveClient)
        } else if info.tool_found == Some(false) {
            Some(Self::ToolNotFound)
        } else {
            None
        }
    }

    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(Self::Auth),
            400 | 422 => Some(Self::BadRequest),
            404 => Some(Self::ToolNotFound),
            408 | 504 => Some(Self::Timeout),
            502 => Some(Self::NetworkUnreachable),
            503 => Some(Self::NoActiveClient),
            _ => None,
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Option<Self> {
        if err.is_timeout() {
            Some(Self::Timeout)
        } else if err.is_connect() {
            Some(Self::NetworkUnreachable)
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16())
        } else if err.is_request() || err.is_body() {
            Some(Self::NetworkUnreachable)
        } else {
            None
        }
    }

    /// Last-resort guess from free-form error text.
    pub fn from_text(text: &str) -> Option<Self> {
        let text = text.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
        if has(&["timed out", "timeout", "deadline exceeded"]) {
            Some(Self::Timeout)
        } else if has(&["unauthorized", "forbidden", "authentication", "not authorized"]) {
            Some(Self::Auth)
        } else if has(&["bad request", "invalid request", "invalid argument"]) {
            Some(Self::BadRequest)
        } else if has(&["econnrefused", "connection refused", "unreachable", "network error"]) {
            Some(Self::NetworkUnreachable)
        } else if has(&["no active client", "no client", "not connected"]) {
            Some(Self::NoActiveClient)
        } else if has(&["tool not found", "unknown tool", "no such tool"]) {
            Some(Self::ToolNotFound)
        } else {
            None
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failure: diagnostic flags, then transport status, then text.
pub fn classify(
    debug_info: Option<&DebugInfo>,
    status: Option<u16>,
    text: Option<&str>,
) -> TransportErrorKind {
    debug_info
        .and_then(TransportErrorKind::from_debug_info)
        .or_else(|| status.and_then(TransportErrorKind::from_status))
        .or_else(|| text.and_then(TransportErrorKind::from_text))
        .unwrap_or(TransportErrorKind::Unknown)
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub tool_name: Option<String>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tool_name: None,
        }
    }

    pub fn with_tool_name(mut self, tool_name: Option<String>) -> Self {
        self.tool_name = tool_name;
        self
    }

    /// Error for a response the server answered with `success: false`.
    pub fn from_response(response: &ApprovalResponse, status: Option<u16>) -> Self {
        let message = response
            .error
            .clone()
            .unwrap_or_else(|| "approval failed".to_string());
        let kind = classify(response.debug_info.as_ref(), status, Some(&message));
        Self::new(kind, message).with_tool_name(response.tool_name.clone())
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = TransportErrorKind::from_reqwest(&err)
            .or_else(|| TransportErrorKind::from_text(&message))
            .unwrap_or(TransportErrorKind::Unknown);
        Self::new(kind, message)
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

/// Failures returned by the approval controller.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flags_follow_precedence() {
        let info = DebugInfo {
            is_network_error: true,
            is_auth_error: true,
            ..DebugInfo::default()
        };
        assert_eq!(classify(Some(&info), None, None), TransportErrorKind::Auth);

        let info = DebugInfo {
            has_active_client: Some(false),
            tool_found: Some(false),
            ..DebugInfo::default()
        };
        assert_eq!(
            classify(Some(&info), Some(500), None),
            TransportErrorKind::NoActiveClient
        );
    }

    #[test]
    fn flags_win_over_status_and_text() {
        let info = DebugInfo {
            is_timeout_error: true,
            ..DebugInfo::default()
        };
        assert_eq!(
            classify(Some(&info), Some(401), Some("tool not found")),
            TransportErrorKind::Timeout
        );
    }

    #[test]
    fn status_then_text() {
        assert_eq!(classify(None, Some(403), None), TransportErrorKind::Auth);
        assert_eq!(classify(None, Some(422), None), TransportErrorKind::BadRequest);
        assert_eq!(
            classify(None, Some(500), Some("connect ECONNREFUSED 127.0.0.1:3000")),
            TransportErrorKind::NetworkUnreachable
        );
        assert_eq!(
            classify(None, None, Some("Unknown tool: frobnicate")),
            TransportErrorKind::ToolNotFound
        );
        assert_eq!(classify(None, None, Some("boom")), TransportErrorKind::Unknown);
    }

    #[test]
    fn every_kind_has_a_distinct_message() {
        let kinds = [
            TransportErrorKind::Timeout,
            TransportErrorKind::Auth,
            TransportErrorKind::BadRequest,
            TransportErrorKind::NetworkUnreachable,
            TransportErrorKind::NoActiveClient,
            TransportErrorKind::ToolNotFound,
            TransportErrorKind::Unknown,
        ];
        let messages: std::collections::HashSet<_> =
            kinds.iter().map(|k| k.user_message()).collect();
        assert_eq!(messages.len(), kinds.len());
    }

    #[test]
    fn response_errors_keep_tool_name() {
        let response = ApprovalResponse::failure("request timed out", None).with_tool_name("gmail_send_email");
        let err = TransportError::from_response(&response, None);
        assert_eq!(err.kind, TransportErrorKind::Timeout);
        assert_eq!(err.tool_name.as_deref(), Some("gmail_send_email"));
        assert_eq!(err.to_string(), "timeout: request timed out");
    }
}
