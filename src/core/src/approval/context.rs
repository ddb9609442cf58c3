use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use toolgate_protocol::{ExecutionRecord, ExecutionStatus};

use crate::marker::ToolCallRequest;
use crate::outbound::{Notice, ViewEvent};
use crate::recovery::RecoveryChain;
use crate::storage::DisplayKey;
use crate::sync::{StateSynchronizer, StatusFeed};

#[derive(Default)]
struct CallState {
    record: Option<ExecutionRecord>,
    optimistic: Option<ExecutionStatus>,
    result_text: Option<String>,
}

impl CallState {
    fn displayed(&self) -> ExecutionStatus {
        self.optimistic
            .or(self.record.as_ref().map(|record| record.status))
            .unwrap_or(ExecutionStatus::Pending)
    }
}

/// Per-call state shared between the view, the controller and the synchronizer.
pub struct CallContext {
    chat_id: String,
    message_id: String,
    request: ToolCallRequest,
    state: Mutex<CallState>,
    events: mpsc::UnboundedSender<ViewEvent>,
    recovery: Arc<RecoveryChain>,
    sync: StateSynchronizer,
}

impl CallContext {
    pub(crate) fn new(
        request: ToolCallRequest,
        record: ExecutionRecord,
        events: mpsc::UnboundedSender<ViewEvent>,
        recovery: Arc<RecoveryChain>,
        feed: Arc<dyn StatusFeed>,
    ) -> Arc<Self> {
        let ctx = Arc::new(Self {
            chat_id: record.chat_id.clone(),
            message_id: record.message_id.clone(),
            request,
            state: Mutex::new(CallState::default()),
            events,
            recovery,
            sync: StateSynchronizer::new(feed),
        });
        ctx.restore(record);
        ctx
    }

    pub fn tool_call_id(&self) -> &str {
        &self.request.id
    }

    pub fn tool_name(&self) -> &str {
        &self.request.name
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn request(&self) -> &ToolCallRequest {
        &self.request
    }

    pub fn display_key(&self) -> DisplayKey {
        DisplayKey::new(&self.chat_id, &self.message_id, &self.request.id)
    }

    /// Status shown to the user: the optimistic overlay if any, else the record's.
    pub fn status(&self) -> ExecutionStatus {
        self.lock().displayed()
    }

    /// Last authoritative record.
    pub fn record(&self) -> Option<ExecutionRecord> {
        self.lock().record.clone()
    }

    pub fn optimistic_status(&self) -> Option<ExecutionStatus> {
        self.lock().optimistic
    }

    pub fn result_text(&self) -> Option<String> {
        self.lock().result_text.clone()
    }

    pub fn start_sync(self: &Arc<Self>) -> bool {
        self.sync.start(self)
    }

    pub fn stop_sync(&self) {
        self.sync.stop();
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_active()
    }

    /// Apply an authoritative record. Returns whether the displayed status changed.
    pub fn apply_record(&self, record: ExecutionRecord) -> bool {
        let mut events = Vec::new();
        let changed = {
            let mut state = self.lock();
            if let Some(held) = &state.record {
                let stale = record.status.rank() < held.status.rank()
                    || (held.status.is_terminal() && record.status != held.status);
                if stale {
                    tracing::debug!(
                        tool_call_id = %self.request.id,
                        held = %held.status,
                        incoming = %record.status,
                        "ignoring stale record"
                    );
                    return false;
                }
            }

            let before = state.displayed();
            state.optimistic = None;
            let status = record.status;
            if status.is_terminal() && state.result_text.is_none() {
                state.result_text = self.recovery.capture(&self.display_key(), &record);
                if let Some(text) = &state.result_text {
                    events.push(ViewEvent::result(&self.request.id, text.clone()));
                }
            }
            state.record = Some(record);

            if before != status {
                events.insert(0, ViewEvent::status(&self.request.id, status));
                true
            } else {
                false
            }
        };
        for event in events {
            self.emit(event);
        }
        changed
    }

    pub(crate) fn set_optimistic(&self, status: ExecutionStatus) {
        let changed = {
            let mut state = self.lock();
            let before = state.displayed();
            state.optimistic = Some(status);
            before != status
        };
        if changed {
            self.emit(ViewEvent::status(&self.request.id, status));
        }
    }

    pub(crate) fn revert_optimistic(&self) {
        let reverted = {
            let mut state = self.lock();
            let before = state.displayed();
            state.optimistic = None;
            let after = state.displayed();
            (before != after).then_some(after)
        };
        if let Some(status) = reverted {
            self.emit(ViewEvent::status(&self.request.id, status));
        }
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.emit(ViewEvent::notice(&self.request.id, notice));
    }

    /// Seed state from the record read at registration time.
    fn restore(&self, record: ExecutionRecord) {
        let recovered = if record.status.is_terminal() {
            self.recovery.recover(&self.display_key(), Some(&record))
        } else {
            None
        };
        {
            let mut state = self.lock();
            state.result_text = recovered.as_ref().map(|r| r.text.clone());
            state.record = Some(record);
        }
        if let Some(recovered) = recovered {
            self.emit(ViewEvent::result(&self.request.id, recovered.text));
        }
    }

    fn emit(&self, event: ViewEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(tool_call_id = %self.request.id, "view event receiver closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
