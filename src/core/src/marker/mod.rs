//! Extraction of approval requests from streamed assistant text.
//!
//! The generation layer signals "this call needs approval" by embedding
//! `__REQUIRES_APPROVAL__:<toolCallId>:<toolName>` in plain text. Parsing
//! never fails: malformed markers fall back to textual patterns, and text
//! without any request is returned whole as narrative.

mod defaults;
mod scanner;

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use toolgate_protocol::APPROVAL_SENTINEL;

use crate::ids::synthetic_tool_call_id;

pub use defaults::default_args;
pub use scanner::MarkerScanner;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"__REQUIRES_APPROVAL__:([^:,\s}"]+):([^:,\s}"]+)"#).expect("marker regex")
});

static PARTIAL_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"__REQUIRES_APPROVAL__(?::([^:,\s}"]*))*"#).expect("partial marker regex")
});

static PARTIAL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"__REQUIRES_APPROVAL__:([^:,\s}"]+)"#).expect("partial id regex")
});

static APPROVAL_NOTICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:[`'"](?P<quoted>[A-Za-z0-9_.\-]+)[`'"]|tool\s+(?P<bare>[A-Za-z0-9\-]*[_.][A-Za-z0-9_.\-]*))[^\n]*?requires explicit user approval[^\n]*"#,
    )
    .expect("approval notice regex")
});

static TOOL_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Error executing tool\s+`?([^`:\s]+)`?\s*:[^\n]*").expect("tool error regex")
});

/// A tool call awaiting user approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCallRequest {
    /// Build a request with family defaults for its arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = strip_sentinel_suffix(&name.into()).to_string();
        Self {
            id: id.into(),
            args: default_args(&name),
            name,
        }
    }

    /// Replace the defaulted arguments once the model supplies real ones.
    /// An empty map keeps the defaults.
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        if !args.is_empty() {
            self.args = args;
        }
        self
    }
}

/// How a request was recovered from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Well-formed `__REQUIRES_APPROVAL__:<id>:<name>`.
    Sentinel,
    /// "tool X requires explicit user approval" sentence.
    ApprovalNotice,
    /// "Error executing tool X:" next to a malformed sentinel.
    ToolError,
}

/// Result of parsing one piece of streamed text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    /// Text the user should see regardless of approval status.
    pub narrative: String,
    /// Requests in the order they appear.
    pub requests: Vec<ToolCallRequest>,
    /// `None` when no request was found.
    pub kind: Option<MarkerKind>,
}

impl ParsedMessage {
    fn plain(text: &str) -> Self {
        Self {
            narrative: text.to_string(),
            requests: Vec::new(),
            kind: None,
        }
    }

    pub fn first(&self) -> Option<&ToolCallRequest> {
        self.requests.first()
    }
}

/// A well-formed marker and where it sits in the text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MarkerMatch {
    pub id: String,
    pub name: String,
    pub span: Range<usize>,
}

/// Parse streamed text into narrative plus approval requests.
///
/// Every well-formed marker is returned; a repeated id keeps its first
/// occurrence.
pub fn parse_message(text: &str) -> ParsedMessage {
    if !text.contains(APPROVAL_SENTINEL) {
        return ParsedMessage::plain(text);
    }

    let matches = scan_markers(text);
    if matches.is_empty() {
        tracing::debug!("approval sentinel present but malformed; trying fallbacks");
        return parse_fallback(text);
    }

    let mut narrative = narrative_without(text, matches.iter().map(|m| m.span.clone()));
    if narrative.contains(APPROVAL_SENTINEL) {
        narrative = PARTIAL_MARKER_RE
            .replace_all(&narrative, "")
            .trim_end()
            .to_string();
    }
    let mut requests: Vec<ToolCallRequest> = Vec::with_capacity(matches.len());
    for m in matches {
        if requests.iter().any(|r| r.id == m.id) {
            continue;
        }
        requests.push(ToolCallRequest::new(m.id, m.name));
    }

    ParsedMessage {
        narrative,
        requests,
        kind: Some(MarkerKind::Sentinel),
    }
}

/// Remove every trailing copy of the sentinel from a tool name.
pub fn strip_sentinel_suffix(name: &str) -> &str {
    let mut name = name.trim();
    while let Some(rest) = name.strip_suffix(APPROVAL_SENTINEL) {
        name = rest;
    }
    name
}

/// Find well-formed markers, splitting names that ran into a following
/// sentinel so back-to-back markers are all found.
pub(crate) fn scan_markers(text: &str) -> Vec<MarkerMatch> {
    let mut found = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let Some(caps) = MARKER_RE.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(id), Some(raw_name)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            break;
        };

        let name_text = raw_name.as_str();
        let (name, end) = match name_text.find(APPROVAL_SENTINEL) {
            Some(first) => {
                let chained = text[raw_name.end()..].starts_with(':');
                let end = if chained {
                    // The last copy of the sentinel opens the next marker.
                    let last = name_text.rfind(APPROVAL_SENTINEL).unwrap_or(first);
                    raw_name.start() + last
                } else {
                    whole.end()
                };
                (&name_text[..first], end)
            }
            None => (name_text, whole.end()),
        };

        if name.is_empty() {
            pos = whole.end();
            continue;
        }

        found.push(MarkerMatch {
            id: id.as_str().to_string(),
            name: name.to_string(),
            span: whole.start()..end,
        });
        pos = end.max(whole.start() + 1);
    }
    found
}

fn parse_fallback(text: &str) -> ParsedMessage {
    let salvaged_id = PARTIAL_ID_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let cleaned = PARTIAL_MARKER_RE.replace_all(text, "").into_owned();

    if let Some(parsed) = parse_approval_notice(&cleaned, salvaged_id.clone()) {
        return parsed;
    }

    if let Some(caps) = TOOL_ERROR_RE.captures(&cleaned) {
        let name = caps
            .get(1)
            .map(|m| strip_sentinel_suffix(m.as_str()))
            .unwrap_or_default();
        if let Some(whole) = caps.get(0).filter(|_| !name.is_empty()) {
            let id = salvaged_id.unwrap_or_else(synthetic_tool_call_id);
            tracing::debug!(tool_call_id = %id, tool_name = %name, "approval recovered from tool error text");
            let span = line_span(&cleaned, whole.range());
            return ParsedMessage {
                narrative: narrative_without(&cleaned, std::iter::once(span)),
                requests: vec![ToolCallRequest::new(id, name)],
                kind: Some(MarkerKind::ToolError),
            };
        }
    }

    ParsedMessage::plain(cleaned.trim())
}

fn parse_approval_notice(text: &str, salvaged_id: Option<String>) -> Option<ParsedMessage> {
    let caps = APPROVAL_NOTICE_RE.captures(text)?;
    let whole = caps.get(0)?;
    let name = caps
        .name("bare")
        .or_else(|| caps.name("quoted"))
        .map(|m| strip_sentinel_suffix(m.as_str()))?;
    if name.is_empty() {
        return None;
    }
    let id = salvaged_id.unwrap_or_else(synthetic_tool_call_id);
    tracing::debug!(tool_call_id = %id, tool_name = %name, "approval recovered from notice text");
    Some(ParsedMessage {
        narrative: narrative_without(text, std::iter::once(line_span(text, whole.range()))),
        requests: vec![ToolCallRequest::new(id, name)],
        kind: Some(MarkerKind::ApprovalNotice),
    })
}

/// Widen a fallback match to the start of its line.
fn line_span(text: &str, span: Range<usize>) -> Range<usize> {
    let start = text[..span.start].rfind('\n').map_or(0, |i| i + 1);
    start..span.end
}

/// Text outside the given spans. The leading segment keeps its leading
/// whitespace; the rest are trimmed and joined by newlines.
fn narrative_without(text: &str, spans: impl Iterator<Item = Range<usize>>) -> String {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for span in spans {
        if span.start >= cursor {
            segments.push(&text[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    segments.push(&text[cursor..]);

    let mut parts: Vec<&str> = Vec::with_capacity(segments.len());
    for (i, segment) in segments.into_iter().enumerate() {
        let piece = if i == 0 {
            segment.trim_end()
        } else {
            segment.trim()
        };
        if !piece.trim().is_empty() {
            parts.push(piece);
        }
    }
    parts.join("\n")
}
