//! Server-side processing of approval commands against the authoritative store.

mod executor;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use toolgate_protocol::{
    ApprovalAction, ApprovalCommand, ApprovalResponse, DebugInfo, ExecutionRecord,
    ExecutionStatus, ExecutionUpdate,
};

use crate::approval::{ApprovalTransport, TransportError};
use crate::storage::{ExecutionStore, StoreError};

pub use executor::{DisconnectedExecutor, ExecutorError, HttpToolExecutor, ToolExecutor};

/// Applies approve/cancel commands and runs approved tools.
pub struct ApprovalService {
    store: Arc<dyn ExecutionStore>,
    executor: Arc<dyn ToolExecutor>,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases an in-flight claim when the approval finishes.
struct Claim<'a> {
    set: &'a Mutex<HashSet<String>>,
    tool_call_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.tool_call_id);
    }
}

impl ApprovalService {
    pub fn new(store: Arc<dyn ExecutionStore>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            store,
            executor,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub async fn handle(&self, command: &ApprovalCommand) -> ApprovalResponse {
        let record = match self.store.get(&command.tool_call_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(tool_call_id = %command.tool_call_id, "approval for unknown tool call");
                return ApprovalResponse::failure(
                    format!("tool call {} not found", command.tool_call_id),
                    Some(DebugInfo {
                        is_bad_request_error: true,
                        ..DebugInfo::default()
                    }),
                );
            }
            Err(err) => return store_failure(err, None),
        };

        match command.action {
            ApprovalAction::Approve => self.approve(record, &command.session_id).await,
            ApprovalAction::Cancel => self.cancel(record).await,
        }
    }

    async fn approve(&self, record: ExecutionRecord, session_id: &str) -> ApprovalResponse {
        let tool_call_id = record.tool_call_id.clone();
        let tool_name = record.tool_name.clone();
        if record.status != ExecutionStatus::Pending {
            tracing::info!(%tool_call_id, status = %record.status, "approve for settled tool call");
            return ApprovalResponse::already_processed(Some(tool_name));
        }
        let Some(_claim) = self.claim(&tool_call_id) else {
            tracing::info!(%tool_call_id, "approve raced with another approval");
            return ApprovalResponse::already_processed(Some(tool_name));
        };

        for status in [ExecutionStatus::Approved, ExecutionStatus::Running] {
            if let Err(err) = self
                .store
                .update(&ExecutionUpdate::status(&tool_call_id, status))
                .await
            {
                return store_failure(err, Some(tool_name));
            }
        }

        tracing::info!(%tool_call_id, %tool_name, "executing approved tool");
        let outcome = self
            .executor
            .execute(&tool_name, &record.tool_params, session_id)
            .await
            .inspect_err(|err| {
                tracing::warn!(%tool_call_id, %tool_name, "tool execution failed: {err}");
            });

        match outcome {
            Ok(result) => {
                let stored = self
                    .store
                    .update(&ExecutionUpdate::completed(&tool_call_id, result.clone()))
                    .await;
                match stored {
                    Ok(_) => ApprovalResponse::success(tool_name, Some(result)),
                    Err(err) => store_failure(err, Some(tool_name)),
                }
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(store_err) = self
                    .store
                    .update(&ExecutionUpdate::failed(&tool_call_id, &message))
                    .await
                {
                    tracing::warn!(%tool_call_id, "failed to record tool error: {store_err}");
                }
                ApprovalResponse::failure(message, Some(err.debug_info())).with_tool_name(tool_name)
            }
        }
    }

    async fn cancel(&self, record: ExecutionRecord) -> ApprovalResponse {
        let update = ExecutionUpdate::status(&record.tool_call_id, ExecutionStatus::Cancelled);
        match self.store.update(&update).await {
            Ok(_) => {
                tracing::info!(tool_call_id = %record.tool_call_id, "tool call cancelled");
                ApprovalResponse::success(record.tool_name, None)
            }
            Err(err) => store_failure(err, Some(record.tool_name)),
        }
    }

    fn claim(&self, tool_call_id: &str) -> Option<Claim<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(tool_call_id.to_string()) {
            return None;
        }
        Some(Claim {
            set: &self.in_flight,
            tool_call_id: tool_call_id.to_string(),
        })
    }
}

fn store_failure(err: StoreError, tool_name: Option<String>) -> ApprovalResponse {
    match err {
        StoreError::AlreadyProcessed { status } => {
            tracing::info!(%status, "command lost a race with another actor");
            ApprovalResponse::already_processed(tool_name)
        }
        other => {
            tracing::warn!("approval store failure: {other}");
            let response = ApprovalResponse::failure(other.to_string(), None);
            match tool_name {
                Some(name) => response.with_tool_name(name),
                None => response,
            }
        }
    }
}

impl ApprovalTransport for ApprovalService {
    fn send<'a>(
        &'a self,
        command: &'a ApprovalCommand,
    ) -> BoxFuture<'a, Result<ApprovalResponse, TransportError>> {
        Box::pin(async move { Ok(self.handle(command).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolgate_protocol::NewExecution;

    struct EchoExecutor {
        calls: AtomicUsize,
        fail_with: Option<ExecutorError>,
    }

    impl ToolExecutor for EchoExecutor {
        fn execute<'a>(
            &'a self,
            tool_name: &'a str,
            params: &'a Value,
            _session_id: &'a str,
        ) -> BoxFuture<'a, Result<Value, ExecutorError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match &self.fail_with {
                    Some(err) => Err(err.clone()),
                    None => Ok(json!({"tool": tool_name, "echo": params})),
                }
            })
        }
    }

    async fn service_with(fail_with: Option<ExecutorError>) -> (ApprovalService, Arc<EchoExecutor>) {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        store
            .create(&NewExecution {
                chat_id: crate::ids::UNSCOPED_CHAT_ID.into(),
                message_id: crate::ids::message_id_for("t1"),
                tool_call_id: "t1".into(),
                tool_name: "gmail_send_email".into(),
                tool_params: json!({"to": "ana@example.com"}),
            })
            .await
            .unwrap();
        let executor = Arc::new(EchoExecutor {
            calls: AtomicUsize::new(0),
            fail_with,
        });
        (ApprovalService::new(store, executor.clone()), executor)
    }

    #[tokio::test]
    async fn approve_executes_and_completes() {
        let (service, executor) = service_with(None).await;
        let resp = service
            .handle(&ApprovalCommand::new("t1", ApprovalAction::Approve, "s1"))
            .await;
        assert!(resp.success);
        assert_eq!(resp.tool_name.as_deref(), Some("gmail_send_email"));
        assert_eq!(
            resp.tool_result,
            Some(json!({"tool": "gmail_send_email", "echo": {"to": "ana@example.com"}}))
        );
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        let record = service.store().get("t1").await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.result, resp.tool_result);
    }

    #[tokio::test]
    async fn second_approve_is_already_processed() {
        let (service, executor) = service_with(None).await;
        let cmd = ApprovalCommand::new("t1", ApprovalAction::Approve, "s1");
        assert!(service.handle(&cmd).await.success);
        let again = service.handle(&cmd).await;
        assert!(again.is_already_processed());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_then_approve() {
        let (service, executor) = service_with(None).await;
        let cancel = service
            .handle(&ApprovalCommand::new("t1", ApprovalAction::Cancel, "s1"))
            .await;
        assert!(cancel.success);

        let approve = service
            .handle(&ApprovalCommand::new("t1", ApprovalAction::Approve, "s1"))
            .await;
        assert!(approve.is_already_processed());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_after_completion_is_already_processed() {
        let (service, _) = service_with(None).await;
        service
            .handle(&ApprovalCommand::new("t1", ApprovalAction::Approve, "s1"))
            .await;
        let cancel = service
            .handle(&ApprovalCommand::new("t1", ApprovalAction::Cancel, "s1"))
            .await;
        assert!(cancel.is_already_processed());
        assert_eq!(cancel.tool_name.as_deref(), Some("gmail_send_email"));
    }

    #[tokio::test]
    async fn executor_failure_records_error_with_flags() {
        let (service, _) = service_with(Some(ExecutorError::NoActiveClient)).await;
        let resp = service
            .handle(&ApprovalCommand::new("t1", ApprovalAction::Approve, "s1"))
            .await;
        assert!(!resp.success);
        assert_eq!(
            resp.debug_info.as_ref().and_then(|d| d.has_active_client),
            Some(false)
        );
        let record = service.store().get("t1").await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Error);
        assert_eq!(
            record.error_message.as_deref(),
            Some("no active tool client for this session")
        );
    }

    #[tokio::test]
    async fn unknown_call_is_bad_request() {
        let (service, _) = service_with(None).await;
        let resp = service
            .handle(&ApprovalCommand::new("missing", ApprovalAction::Approve, "s1"))
            .await;
        assert!(!resp.success);
        assert!(resp.debug_info.unwrap().is_bad_request_error);
    }
}
