use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use toolgate_protocol::{ExecutionRecord, ExecutionStatus};

use crate::storage::ExecutionStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(60);

/// Timing of status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub poll_ceiling: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_ceiling: DEFAULT_POLL_CEILING,
        }
    }
}

/// Source of authoritative record updates for one tool call.
pub trait StatusFeed: Send + Sync + 'static {
    /// Records in arrival order. The stream ends once the call is terminal
    /// or the feed gives up.
    fn subscribe(&self, tool_call_id: &str) -> BoxStream<'static, ExecutionRecord>;
}

/// Status feed backed by periodic reads of an [`ExecutionStore`].
pub struct PollingFeed {
    store: Arc<dyn ExecutionStore>,
    config: SyncConfig,
}

impl PollingFeed {
    pub fn new(store: Arc<dyn ExecutionStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }
}

struct PollState {
    store: Arc<dyn ExecutionStore>,
    tool_call_id: String,
    config: SyncConfig,
    timer: Option<(Interval, Instant)>,
    last: Option<ExecutionStatus>,
    done: bool,
}

impl StatusFeed for PollingFeed {
    fn subscribe(&self, tool_call_id: &str) -> BoxStream<'static, ExecutionRecord> {
        let state = PollState {
            store: self.store.clone(),
            tool_call_id: tool_call_id.to_string(),
            config: self.config,
            timer: None,
            last: None,
            done: false,
        };
        stream::unfold(state, poll_next).boxed()
    }
}

async fn poll_next(mut state: PollState) -> Option<(ExecutionRecord, PollState)> {
    if state.done {
        return None;
    }
    loop {
        let (interval, deadline) = state.timer.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(state.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            (interval, Instant::now() + state.config.poll_ceiling)
        });
        interval.tick().await;
        if Instant::now() >= *deadline {
            tracing::info!(
                tool_call_id = %state.tool_call_id,
                last_status = ?state.last,
                "status polling reached its ceiling"
            );
            return None;
        }

        match state.store.get(&state.tool_call_id).await {
            Ok(Some(record)) => {
                if state.last == Some(record.status) {
                    continue;
                }
                state.last = Some(record.status);
                state.done = record.status.is_terminal();
                return Some((record, state));
            }
            Ok(None) => {
                tracing::debug!(tool_call_id = %state.tool_call_id, "record not visible yet");
            }
            Err(err) => {
                tracing::warn!(tool_call_id = %state.tool_call_id, "status poll failed: {err}");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::StoreError;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use toolgate_protocol::{ExecutionUpdate, NewExecution};

    pub(crate) fn record_with(tool_call_id: &str, status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            tool_call_id: tool_call_id.to_string(),
            chat_id: "00000000-0000-0000-0000-000000000000".into(),
            message_id: "m1".into(),
            tool_name: "google_calendar_list_events".into(),
            tool_params: json!({}),
            status,
            result: None,
            error_message: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Store whose reads replay a script; the last entry repeats forever.
    pub(crate) struct ScriptedStore {
        script: Mutex<VecDeque<Option<ExecutionRecord>>>,
        pub(crate) reads: AtomicUsize,
    }

    impl ScriptedStore {
        pub(crate) fn new(script: Vec<Option<ExecutionRecord>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl ExecutionStore for ScriptedStore {
        fn get<'a>(
            &'a self,
            _tool_call_id: &'a str,
        ) -> BoxFuture<'a, Result<Option<ExecutionRecord>, StoreError>> {
            Box::pin(async move {
                self.reads.fetch_add(1, Ordering::SeqCst);
                let mut script = self.script.lock().unwrap();
                let next = if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().flatten()
                };
                Ok(next)
            })
        }

        fn create<'a>(
            &'a self,
            _new: &'a NewExecution,
        ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>> {
            Box::pin(async { Err(StoreError::Backend("read only".into())) })
        }

        fn update<'a>(
            &'a self,
            _update: &'a ExecutionUpdate,
        ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>> {
            Box::pin(async { Err(StoreError::Backend("read only".into())) })
        }

        fn list_for_chat<'a>(
            &'a self,
            _chat_id: &'a str,
        ) -> BoxFuture<'a, Result<Vec<ExecutionRecord>, StoreError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn yields_only_status_changes_until_terminal() {
        let store = Arc::new(ScriptedStore::new(vec![
            None,
            Some(record_with("t1", ExecutionStatus::Pending)),
            Some(record_with("t1", ExecutionStatus::Pending)),
            Some(record_with("t1", ExecutionStatus::Running)),
            Some(record_with("t1", ExecutionStatus::Completed)),
        ]));
        let feed = PollingFeed::new(store.clone(), SyncConfig::default());

        let statuses: Vec<_> = feed
            .subscribe("t1")
            .map(|record| record.status)
            .collect()
            .await;
        assert_eq!(
            statuses,
            vec![
                ExecutionStatus::Pending,
                ExecutionStatus::Running,
                ExecutionStatus::Completed
            ]
        );
        assert_eq!(store.reads.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn first_read_is_immediate() {
        let store = Arc::new(ScriptedStore::new(vec![Some(record_with(
            "t1",
            ExecutionStatus::Completed,
        ))]));
        let feed = PollingFeed::new(store, SyncConfig::default());
        let started = Instant::now();
        let mut stream = feed.subscribe("t1");
        assert!(stream.next().await.is_some());
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_ceiling_without_terminal_status() {
        let store = Arc::new(ScriptedStore::new(vec![Some(record_with(
            "t1",
            ExecutionStatus::Running,
        ))]));
        let feed = PollingFeed::new(store.clone(), SyncConfig::default());
        let started = Instant::now();

        let statuses: Vec<_> = feed.subscribe("t1").map(|r| r.status).collect().await;
        assert_eq!(statuses, vec![ExecutionStatus::Running]);
        assert_eq!(started.elapsed(), DEFAULT_POLL_CEILING);
        assert_eq!(store.reads.load(Ordering::SeqCst), 60);
    }
}
