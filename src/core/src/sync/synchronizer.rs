use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::task::JoinHandle;

use super::StatusFeed;
use crate::approval::CallContext;

/// Drives one call context from a [`StatusFeed`] until the feed ends.
///
/// Dropping the synchronizer aborts its task.
pub struct StateSynchronizer {
    feed: Arc<dyn StatusFeed>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StateSynchronizer {
    pub fn new(feed: Arc<dyn StatusFeed>) -> Self {
        Self {
            feed,
            task: Mutex::new(None),
        }
    }

    /// Start syncing `ctx`. Returns `false` when a sync is already running.
    pub fn start(&self, ctx: &Arc<CallContext>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let tool_call_id = ctx.tool_call_id().to_string();
        let mut updates = self.feed.subscribe(&tool_call_id);
        let ctx = Arc::downgrade(ctx);
        *task = Some(tokio::spawn(async move {
            while let Some(record) = updates.next().await {
                let Some(ctx) = ctx.upgrade() else {
                    tracing::debug!(%tool_call_id, "call context dropped; sync exiting");
                    return;
                };
                ctx.apply_record(record);
            }
            tracing::debug!(%tool_call_id, "status sync finished");
        }));
        true
    }

    pub fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for StateSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}
