use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use toolgate_protocol::{
    ApprovalCommand, ApprovalResponse, ExecutionStatus, ExecutionUpdate, NewExecution,
    ALREADY_PROCESSED,
};

use crate::approval::TransportErrorKind;
use crate::ids::{message_id_for, normalize_chat_id};
use crate::service::{ApprovalService, ToolExecutor};
use crate::storage::{ExecutionStore, StoreError};

/// Shared state accessible by handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<dyn ExecutionStore>,
    pub service: Arc<ApprovalService>,
}

/// Error body of the execution endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// Current status, on 409.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ExecutionStatus>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
            from: None,
            to: None,
        }
    }
}

/// Build the axum router for the approval gateway.
///
/// Exposes the approval command endpoint, the execution record endpoints
/// and `/health`.
pub fn build_router(store: Arc<dyn ExecutionStore>, executor: Arc<dyn ToolExecutor>) -> Router {
    let service = Arc::new(ApprovalService::new(store.clone(), executor));
    let state = AppState { store, service };

    Router::new()
        .route("/api/tool-approval", post(approve_or_cancel))
        .route("/api/tool-executions", post(create_execution))
        .route(
            "/api/tool-executions/{tool_call_id}",
            get(get_execution).patch(update_execution),
        )
        .route("/api/chats/{chat_id}/tool-executions", get(list_executions))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn approve_or_cancel(
    State(state): State<AppState>,
    Json(command): Json<ApprovalCommand>,
) -> Response {
    tracing::debug!(
        tool_call_id = %command.tool_call_id,
        action = %command.action,
        "approval command received"
    );
    let response = state.service.handle(&command).await;
    (approval_status(&response), Json(response)).into_response()
}

/// HTTP status for an approval response.
pub fn approval_status(response: &ApprovalResponse) -> StatusCode {
    if response.success {
        return StatusCode::OK;
    }
    if response.is_already_processed() {
        return StatusCode::CONFLICT;
    }
    match response
        .debug_info
        .as_ref()
        .and_then(TransportErrorKind::from_debug_info)
    {
        Some(TransportErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(TransportErrorKind::Auth) => StatusCode::UNAUTHORIZED,
        Some(TransportErrorKind::BadRequest) => StatusCode::BAD_REQUEST,
        Some(TransportErrorKind::NetworkUnreachable) => StatusCode::BAD_GATEWAY,
        Some(TransportErrorKind::NoActiveClient) => StatusCode::SERVICE_UNAVAILABLE,
        Some(TransportErrorKind::ToolNotFound) => StatusCode::NOT_FOUND,
        Some(TransportErrorKind::Unknown) | None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn create_execution(
    State(state): State<AppState>,
    Json(mut new): Json<NewExecution>,
) -> Response {
    new.chat_id = normalize_chat_id(Some(&new.chat_id));
    if new.message_id.trim().is_empty() {
        new.message_id = message_id_for(&new.tool_call_id);
    }
    match state.store.create(&new).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn get_execution(
    State(state): State<AppState>,
    Path(tool_call_id): Path<String>,
) -> Response {
    match state.store.get(&tool_call_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => store_error_response(StoreError::NotFound(tool_call_id)),
        Err(err) => store_error_response(err),
    }
}

async fn update_execution(
    State(state): State<AppState>,
    Path(tool_call_id): Path<String>,
    Json(mut update): Json<ExecutionUpdate>,
) -> Response {
    update.tool_call_id = tool_call_id;
    match state.store.update(&update).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn list_executions(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Response {
    let chat_id = normalize_chat_id(Some(&chat_id));
    match state.store.list_for_chat(&chat_id).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => store_error_response(err),
    }
}

fn store_error_response(err: StoreError) -> Response {
    let (status, body) = match err {
        StoreError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            ErrorBody::new(format!("tool call not found: {id}")),
        ),
        StoreError::AlreadyProcessed { status } => (
            StatusCode::CONFLICT,
            ErrorBody {
                status: Some(status),
                ..ErrorBody::new(ALREADY_PROCESSED)
            },
        ),
        StoreError::InvalidTransition { from, to } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorBody {
                from: Some(from),
                to: Some(to),
                ..ErrorBody::new(format!("invalid transition {from} -> {to}"))
            },
        ),
        StoreError::Transport(err) => (StatusCode::BAD_GATEWAY, ErrorBody::new(err.to_string())),
        StoreError::Backend(message) => {
            tracing::error!("execution store failure: {message}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("execution store failure"),
            )
        }
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DisconnectedExecutor;
    use crate::storage::SqliteStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use toolgate_protocol::DebugInfo;

    fn router() -> Router {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        build_router(store, Arc::new(DisconnectedExecutor))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn approval_statuses() {
        let flagged = |info: DebugInfo| ApprovalResponse::failure("x", Some(info));
        assert_eq!(
            approval_status(&ApprovalResponse::success("t", None)),
            StatusCode::OK
        );
        assert_eq!(
            approval_status(&ApprovalResponse::already_processed(None)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            approval_status(&flagged(DebugInfo {
                is_timeout_error: true,
                ..DebugInfo::default()
            })),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            approval_status(&flagged(DebugInfo {
                has_active_client: Some(false),
                ..DebugInfo::default()
            })),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            approval_status(&flagged(DebugInfo {
                tool_found: Some(false),
                ..DebugInfo::default()
            })),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            approval_status(&ApprovalResponse::failure("boom", None)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let resp = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_record_is_404() {
        let resp = router()
            .oneshot(
                Request::builder()
                    .uri("/api/tool-executions/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn approve_without_client_is_503() {
        let app = router();
        let created = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/tool-executions",
                serde_json::json!({
                    "chat_id": "",
                    "message_id": "",
                    "tool_call_id": "t1",
                    "tool_name": "gmail_send_email",
                    "tool_params": {}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);

        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/tool-approval",
                serde_json::json!({"toolCallId": "t1", "action": "approve", "sessionId": "s1"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
