//! Reconstruction of previously displayed tool results after a reload.
//!
//! Tiers are consulted in order: render marker, display cache, session
//! state, then a cold format of the execution record. The winning text is
//! written through to every other tier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use toolgate_protocol::ExecutionRecord;

use crate::format::ResultFormatter;
use crate::storage::{DisplayCache, DisplayKey, RenderMarker, RenderMarkers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    RenderMarker,
    DisplayCache,
    Session,
    ColdFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub text: String,
    pub tier: RecoveryTier,
}

pub struct RecoveryChain {
    markers: Arc<dyn RenderMarkers>,
    cache: Arc<dyn DisplayCache>,
    session: Mutex<HashMap<DisplayKey, String>>,
    formatter: ResultFormatter,
}

impl RecoveryChain {
    pub fn new(
        markers: Arc<dyn RenderMarkers>,
        cache: Arc<dyn DisplayCache>,
        formatter: ResultFormatter,
    ) -> Self {
        Self {
            markers,
            cache,
            session: Mutex::new(HashMap::new()),
            formatter,
        }
    }

    pub fn formatter(&self) -> &ResultFormatter {
        &self.formatter
    }

    /// Find the text last shown for a call.
    pub fn recover(&self, key: &DisplayKey, record: Option<&ExecutionRecord>) -> Option<Recovered> {
        let found = self
            .from_marker(key)
            .map(|text| (text, RecoveryTier::RenderMarker))
            .or_else(|| self.from_cache(key).map(|t| (t, RecoveryTier::DisplayCache)))
            .or_else(|| self.from_session(key).map(|t| (t, RecoveryTier::Session)))
            .or_else(|| {
                record
                    .and_then(|r| self.formatter.format_record(r))
                    .map(|t| (t, RecoveryTier::ColdFormat))
            });

        let (text, tier) = found?;
        tracing::debug!(
            tool_call_id = %key.tool_call_id,
            tier = ?tier,
            "recovered tool result"
        );
        self.write_through(key, &text, Some(tier));
        Some(Recovered { text, tier })
    }

    /// Format a terminal record and persist the text to every tier.
    pub fn capture(&self, key: &DisplayKey, record: &ExecutionRecord) -> Option<String> {
        let text = self.formatter.format_record(record)?;
        self.write_through(key, &text, None);
        Some(text)
    }

    fn from_marker(&self, key: &DisplayKey) -> Option<String> {
        match self.markers.marker(&key.message_id, &key.tool_call_id) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(tool_call_id = %key.tool_call_id, "render marker read failed: {err}");
                None
            }
        }
    }

    fn from_cache(&self, key: &DisplayKey) -> Option<String> {
        match self.cache.cached(key) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(tool_call_id = %key.tool_call_id, "display cache read failed: {err}");
                None
            }
        }
    }

    fn from_session(&self, key: &DisplayKey) -> Option<String> {
        self.session
            .lock()
            .ok()
            .and_then(|session| session.get(key).cloned())
    }

    fn write_through(&self, key: &DisplayKey, text: &str, winner: Option<RecoveryTier>) {
        if winner != Some(RecoveryTier::RenderMarker) {
            let marker = RenderMarker {
                message_id: key.message_id.clone(),
                tool_call_id: key.tool_call_id.clone(),
                text: text.to_string(),
                created_at: chrono::Utc::now().timestamp().max(0) as u64,
            };
            if let Err(err) = self.markers.attach_marker(&marker) {
                tracing::warn!(tool_call_id = %key.tool_call_id, "render marker write failed: {err}");
            }
        }
        if winner != Some(RecoveryTier::DisplayCache) {
            if let Err(err) = self.cache.put_cached(key, text) {
                tracing::warn!(tool_call_id = %key.tool_call_id, "display cache write failed: {err}");
            }
        }
        if winner != Some(RecoveryTier::Session) {
            if let Ok(mut session) = self.session.lock() {
                session.insert(key.clone(), text.to_string());
            }
        }
    }
}
