use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use toolgate_protocol::{
    ApprovalAction, ApprovalCommand, ApprovalResponse, ExecutionStatus, NewExecution,
};

use super::{ApprovalError, CallContext, TransportError};
use crate::client::HttpGateway;
use crate::config::ClientConfig;
use crate::format::ResultFormatter;
use crate::ids::{message_id_for, normalize_chat_id};
use crate::marker::ToolCallRequest;
use crate::outbound::{Notice, ViewEvent};
use crate::recovery::RecoveryChain;
use crate::storage::{ExecutionStore, SqliteDisplayStore};
use crate::sync::{PollingFeed, StatusFeed};
use crate::toolgate_config::ToolgateConfig;

/// Delivery of approval commands to whoever executes tools.
pub trait ApprovalTransport: Send + Sync + 'static {
    /// Send a command. `Ok` carries any decoded response, including
    /// `success: false`; `Err` means no usable response arrived.
    fn send<'a>(
        &'a self,
        command: &'a ApprovalCommand,
    ) -> BoxFuture<'a, Result<ApprovalResponse, TransportError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The command was accepted; the synchronizer is tracking the call.
    Accepted,
    /// Another actor resolved the call first.
    AlreadyResolved(ExecutionStatus),
}

/// Issues approve/cancel commands on behalf of one view.
pub struct ApprovalController {
    store: Arc<dyn ExecutionStore>,
    transport: Arc<dyn ApprovalTransport>,
    feed: Arc<dyn StatusFeed>,
    recovery: Arc<RecoveryChain>,
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl ApprovalController {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        transport: Arc<dyn ApprovalTransport>,
        feed: Arc<dyn StatusFeed>,
        recovery: Arc<RecoveryChain>,
        events: mpsc::UnboundedSender<ViewEvent>,
    ) -> Self {
        Self {
            store,
            transport,
            feed,
            recovery,
            events,
        }
    }

    /// Controller for a view talking to a gateway over HTTP, with results
    /// cached in the configured display store.
    pub fn connect(
        config: &ClientConfig,
        events: mpsc::UnboundedSender<ViewEvent>,
    ) -> Result<Self, String> {
        let gateway = Arc::new(HttpGateway::from_config(config)?);
        let display = Arc::new(SqliteDisplayStore::from_config(config)?);
        let feed = Arc::new(PollingFeed::new(gateway.clone(), config.sync));
        let recovery = Arc::new(RecoveryChain::new(
            display.clone(),
            display,
            ResultFormatter::default(),
        ));
        Ok(Self::new(gateway.clone(), gateway, feed, recovery, events))
    }

    /// [`connect`](Self::connect) with the settings in `~/.toolgate/config.toml`.
    pub fn connect_from_user_config(
        events: mpsc::UnboundedSender<ViewEvent>,
    ) -> Result<Self, String> {
        let config = ToolgateConfig::load()?.client_config()?;
        tracing::debug!(base_url = %config.base_url, "loaded toolgate client config");
        Self::connect(&config, events)
    }

    /// Create or read back the record for a request and build its context.
    ///
    /// Calls already in flight resume syncing.
    pub async fn register(
        &self,
        chat_id: Option<&str>,
        request: ToolCallRequest,
    ) -> Result<Arc<CallContext>, ApprovalError> {
        let new = NewExecution {
            chat_id: normalize_chat_id(chat_id),
            message_id: message_id_for(&request.id),
            tool_call_id: request.id.clone(),
            tool_name: request.name.clone(),
            tool_params: Value::Object(request.args.clone()),
        };
        let record = match self.store.create(&new).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(tool_call_id = %request.id, "create failed, reading back: {err}");
                match self.store.get(&request.id).await? {
                    Some(record) => record,
                    None => return Err(err.into()),
                }
            }
        };

        let in_flight = matches!(
            record.status,
            ExecutionStatus::Approved | ExecutionStatus::Running
        );
        let ctx = CallContext::new(
            request,
            record,
            self.events.clone(),
            self.recovery.clone(),
            self.feed.clone(),
        );
        if in_flight {
            ctx.start_sync();
        }
        Ok(ctx)
    }

    pub async fn approve(
        &self,
        ctx: &Arc<CallContext>,
        session_id: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        self.dispatch(ctx, ApprovalAction::Approve, session_id).await
    }

    pub async fn cancel(
        &self,
        ctx: &Arc<CallContext>,
        session_id: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        self.dispatch(ctx, ApprovalAction::Cancel, session_id).await
    }

    async fn dispatch(
        &self,
        ctx: &Arc<CallContext>,
        action: ApprovalAction,
        session_id: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let current = ctx.status();
        if current.is_terminal() {
            return Ok(ApprovalOutcome::AlreadyResolved(current));
        }

        let optimistic = match action {
            ApprovalAction::Approve => ExecutionStatus::Approved,
            ApprovalAction::Cancel => ExecutionStatus::Cancelled,
        };
        ctx.set_optimistic(optimistic);

        let command = ApprovalCommand::new(ctx.tool_call_id(), action, session_id);
        let response = self.transport.send(&command).await;
        match response {
            Ok(response) if response.success => {
                tracing::info!(
                    tool_call_id = %ctx.tool_call_id(),
                    action = %action,
                    "approval command accepted"
                );
                ctx.start_sync();
                Ok(ApprovalOutcome::Accepted)
            }
            Ok(response) if response.is_already_processed() => {
                tracing::info!(
                    tool_call_id = %ctx.tool_call_id(),
                    action = %action,
                    "tool call already processed; reconciling"
                );
                let status = self.reconcile(ctx).await;
                Ok(ApprovalOutcome::AlreadyResolved(status))
            }
            Ok(response) => {
                let err = TransportError::from_response(&response, None);
                Err(self.fail(ctx, action, err).await)
            }
            Err(err) => Err(self.fail(ctx, action, err).await),
        }
    }

    /// Pull the store's view; the overlay is dropped either way.
    ///
    /// A call another actor left in flight resumes syncing.
    async fn reconcile(&self, ctx: &Arc<CallContext>) -> ExecutionStatus {
        match self.store.get(ctx.tool_call_id()).await {
            Ok(Some(record)) => {
                let in_flight = matches!(
                    record.status,
                    ExecutionStatus::Approved | ExecutionStatus::Running
                );
                ctx.apply_record(record);
                if in_flight {
                    ctx.start_sync();
                }
            }
            Ok(None) => {
                tracing::warn!(tool_call_id = %ctx.tool_call_id(), "record missing during reconcile");
            }
            Err(err) => {
                tracing::warn!(tool_call_id = %ctx.tool_call_id(), "reconcile read failed: {err}");
            }
        }
        ctx.revert_optimistic();
        ctx.status()
    }

    async fn fail(
        &self,
        ctx: &Arc<CallContext>,
        action: ApprovalAction,
        err: TransportError,
    ) -> ApprovalError {
        tracing::warn!(
            tool_call_id = %ctx.tool_call_id(),
            action = %action,
            kind = %err.kind,
            "approval command failed; rolling back: {}",
            err.message
        );
        ctx.revert_optimistic();
        ctx.notify(Notice::error(err.user_message()));
        // The server may have settled the call before failing the command.
        self.reconcile(ctx).await;
        let err = match err.tool_name {
            Some(_) => err,
            None => err.with_tool_name(Some(ctx.tool_name().to_string())),
        };
        ApprovalError::Transport(err)
    }
}
