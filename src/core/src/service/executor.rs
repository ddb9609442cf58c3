use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use thiserror::Error;
use toolgate_protocol::DebugInfo;
use url::Url;

/// Runs an approved tool call. Execution itself lives outside this crate.
pub trait ToolExecutor: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        tool_name: &'a str,
        params: &'a Value,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>>;
}

#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("tool execution timed out")]
    Timeout,

    #[error("executor rejected credentials: {0}")]
    Unauthorized(String),

    #[error("executor rejected the request: {0}")]
    BadRequest(String),

    #[error("tool executor unreachable: {0}")]
    Unreachable(String),

    #[error("no active tool client for this session")]
    NoActiveClient,

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("{0}")]
    Failed(String),
}

impl ExecutorError {
    /// Diagnostic flags reported back with the approval response.
    pub fn debug_info(&self) -> DebugInfo {
        let mut info = DebugInfo {
            has_active_client: Some(true),
            tool_found: Some(true),
            ..DebugInfo::default()
        };
        match self {
            Self::Timeout => info.is_timeout_error = true,
            Self::Unauthorized(_) => info.is_auth_error = true,
            Self::BadRequest(_) => info.is_bad_request_error = true,
            Self::Unreachable(_) => info.is_network_error = true,
            Self::NoActiveClient => info.has_active_client = Some(false),
            Self::ToolNotFound(_) => info.tool_found = Some(false),
            Self::Failed(_) => {}
        }
        info
    }
}

/// Stand-in executor used when no tool client is configured.
pub struct DisconnectedExecutor;

impl ToolExecutor for DisconnectedExecutor {
    fn execute<'a>(
        &'a self,
        _tool_name: &'a str,
        _params: &'a Value,
        _session_id: &'a str,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>> {
        Box::pin(async { Err(ExecutorError::NoActiveClient) })
    }
}

/// Forwards tool calls to an HTTP tool runner.
///
/// The runner receives `{toolName, params, sessionId}` and answers with the
/// raw result, optionally wrapped as `{result}`.
pub struct HttpToolExecutor {
    client: reqwest::Client,
    url: Url,
}

impl HttpToolExecutor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, String> {
        let url = Url::parse(url).map_err(|e| format!("invalid executor url {url:?}: {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;
        Ok(Self { client, url })
    }
}

impl ToolExecutor for HttpToolExecutor {
    fn execute<'a>(
        &'a self,
        tool_name: &'a str,
        params: &'a Value,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>> {
        Box::pin(async move {
            let body = json!({
                "toolName": tool_name,
                "params": params,
                "sessionId": session_id,
            });
            let resp = self
                .client
                .post(self.url.clone())
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ExecutorError::Timeout
                    } else {
                        ExecutorError::Unreachable(e.to_string())
                    }
                })?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(match status.as_u16() {
                    401 | 403 => ExecutorError::Unauthorized(text),
                    400 | 422 => ExecutorError::BadRequest(text),
                    404 => ExecutorError::ToolNotFound(tool_name.to_string()),
                    408 | 504 => ExecutorError::Timeout,
                    503 => ExecutorError::NoActiveClient,
                    code => ExecutorError::Failed(format!("executor returned {code}: {text}")),
                });
            }

            let value: Value = resp.json().await.map_err(|e| {
                if e.is_timeout() {
                    ExecutorError::Timeout
                } else {
                    ExecutorError::Failed(format!("invalid executor response: {e}"))
                }
            })?;
            match value {
                Value::Object(mut map) if map.contains_key("result") => {
                    Ok(map.remove("result").unwrap_or(Value::Null))
                }
                other => Ok(other),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_info_flags_match_error() {
        let info = ExecutorError::NoActiveClient.debug_info();
        assert_eq!(info.has_active_client, Some(false));
        assert!(!info.is_timeout_error);

        let info = ExecutorError::ToolNotFound("x".into()).debug_info();
        assert_eq!(info.tool_found, Some(false));
        assert_eq!(info.has_active_client, Some(true));

        let info = ExecutorError::Failed("boom".into()).debug_info();
        assert_eq!(info, DebugInfo {
            has_active_client: Some(true),
            tool_found: Some(true),
            ..DebugInfo::default()
        });
    }

    #[test]
    fn executor_url_is_validated() {
        assert!(HttpToolExecutor::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpToolExecutor::new("http://127.0.0.1:9/run", Duration::from_secs(1)).is_ok());
    }
}
