//! Normalization of heterogeneous tool results into display text.
//!
//! Results arrive as a plain string, an MCP-style `{content: [{type, text}]}`
//! envelope, or raw JSON, often with JSON encoded inside the text part.
//! Formatting is idempotent: already formatted text passes through.

mod families;
mod repair;

use pulldown_cmark::{Event, Options, Parser, Tag};
use serde_json::Value;
use toolgate_protocol::{ExecutionRecord, ExecutionStatus};

use crate::family::ToolFamily;

pub use families::{
    render_generic, CalendarFormatter, FamilyFormatter, FormatterRegistry, MailFormatter,
};

/// Signature of a result that went through a lossy object-to-string cast.
pub const CORRUPTION_SIGNATURE: &str = "[object Object]";

/// Shown instead of a corrupted result that could not be repaired.
pub const DEGRADED_NOTICE: &str =
    "_This result could not be displayed because its stored content is corrupted._";

const EMPTY_COMPLETION: &str = "_The tool completed without returning any output._";

/// Nested content envelopes unwrapped before the rest is rendered as-is.
const MAX_NESTED_DECODE: usize = 2;

/// A tool result after envelope and encoding have been peeled off.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    /// Free text that is not JSON.
    Text(String),
    /// Text that already carries markdown structure.
    Formatted(String),
    Structured { family: ToolFamily, value: Value },
}

/// Formats tool results through a per-family registry.
pub struct ResultFormatter {
    registry: FormatterRegistry,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(FormatterRegistry::with_defaults())
    }
}

impl ResultFormatter {
    pub fn new(registry: FormatterRegistry) -> Self {
        Self { registry }
    }

    /// Render a raw result for display.
    pub fn format(&self, tool_name: &str, raw: &Value) -> String {
        let family = ToolFamily::classify(tool_name);
        let text = self.render_payload(resolve_payload(family, raw));
        if !text.contains(CORRUPTION_SIGNATURE) {
            return text;
        }

        tracing::warn!(tool_name, "corrupted tool result; attempting repair");
        match repair::recover_nested(raw) {
            Some(value) => {
                let repaired = self.render_payload(ToolPayload::Structured {
                    family,
                    value: select_payload(family, value),
                });
                if repaired.contains(CORRUPTION_SIGNATURE) {
                    DEGRADED_NOTICE.to_string()
                } else {
                    repaired
                }
            }
            None => DEGRADED_NOTICE.to_string(),
        }
    }

    /// Display text for a record, if its status has any.
    pub fn format_record(&self, record: &ExecutionRecord) -> Option<String> {
        match record.status {
            ExecutionStatus::Completed => Some(match &record.result {
                Some(result) if !result.is_null() => self.format(&record.tool_name, result),
                _ => EMPTY_COMPLETION.to_string(),
            }),
            ExecutionStatus::Error => Some(format!(
                "**Error:** {}",
                record
                    .error_message
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or("The tool failed without an error message.")
            )),
            _ => None,
        }
    }

    fn render_payload(&self, payload: ToolPayload) -> String {
        match payload {
            ToolPayload::Text(text) | ToolPayload::Formatted(text) => text,
            ToolPayload::Structured { family, value } => self.registry.render(family, &value),
        }
    }
}

/// Peel the envelope and any JSON encoding off a raw result.
pub fn resolve_payload(family: ToolFamily, raw: &Value) -> ToolPayload {
    match raw {
        Value::String(text) => resolve_text(family, text, 0),
        Value::Object(map) => match first_text_part(map.get("content")) {
            Some(text) => resolve_text(family, text, 0),
            None => ToolPayload::Structured {
                family,
                value: select_payload(family, raw.clone()),
            },
        },
        Value::Array(_) => ToolPayload::Structured {
            family,
            value: select_payload(family, raw.clone()),
        },
        Value::Null => ToolPayload::Text(String::new()),
        other => ToolPayload::Text(other.to_string()),
    }
}

fn resolve_text(family: ToolFamily, text: &str, depth: usize) -> ToolPayload {
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            if let Value::Object(map) = &value {
                if let Some(inner) = first_text_part(map.get("content")) {
                    if depth < MAX_NESTED_DECODE {
                        return resolve_text(family, inner, depth + 1);
                    }
                }
            }
            ToolPayload::Structured {
                family,
                value: select_payload(family, value),
            }
        }
        // Each decoded layer is strictly shorter than the last.
        Ok(Value::String(inner)) => resolve_text(family, &inner, depth),
        _ if looks_formatted(trimmed) => ToolPayload::Formatted(trimmed.to_string()),
        _ => ToolPayload::Text(trimmed.to_string()),
    }
}

fn first_text_part(content: Option<&Value>) -> Option<&str> {
    content?.as_array()?.iter().find_map(|part| {
        if part.get("type").and_then(Value::as_str) == Some("text") {
            part.get("text").and_then(Value::as_str)
        } else {
            None
        }
    })
}

/// Pick the list a family's payload actually carries.
///
/// Calendar tools put events under `results`; other providers use `result`.
pub fn select_payload(family: ToolFamily, value: Value) -> Value {
    if family == ToolFamily::Calendar {
        if let Some(results @ Value::Array(_)) = value.get("results") {
            return results.clone();
        }
    }
    if let Some(result @ Value::Array(_)) = value.get("result") {
        return result.clone();
    }
    value
}

/// Whether text already carries markdown structure from a previous pass.
pub fn looks_formatted(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    Parser::new_ext(text, options).any(|event| {
        matches!(
            event,
            Event::Start(
                Tag::Strong
                    | Tag::Emphasis
                    | Tag::Heading { .. }
                    | Tag::List(_)
                    | Tag::CodeBlock(_)
                    | Tag::BlockQuote(_)
                    | Tag::Table(_)
            ) | Event::Rule
                | Event::Code(_)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn formatter() -> ResultFormatter {
        ResultFormatter::default()
    }

    fn calendar_envelope() -> Value {
        let inner = json!({
            "successful": true,
            "results": [
                {"summary": "Team sync", "start": {"dateTime": "2026-10-19T10:00:00Z"}, "end": {"dateTime": "2026-10-19T10:30:00Z"}},
                {"summary": "Dentist", "start": {"date": "2026-10-21"}, "location": "Main St"}
            ]
        });
        json!({"content": [{"type": "text", "text": inner.to_string()}]})
    }

    #[test]
    fn calendar_results_are_extracted_from_envelope() {
        let f = formatter();
        let out = f.format("google_calendar_list_events", &calendar_envelope());
        let expected = FormatterRegistry::with_defaults().render(
            ToolFamily::Calendar,
            &json!([
                {"summary": "Team sync", "start": {"dateTime": "2026-10-19T10:00:00Z"}, "end": {"dateTime": "2026-10-19T10:30:00Z"}},
                {"summary": "Dentist", "start": {"date": "2026-10-21"}, "location": "Main St"}
            ]),
        );
        assert_eq!(out, expected);
        assert!(out.contains("Team sync"));
        assert!(!out.contains("successful"));
    }

    #[test]
    fn result_arrays_are_used_for_any_family() {
        let raw = json!({"result": [{"name": "a"}], "meta": {"page": 1}});
        let out = formatter().format("crm_lookup", &raw);
        assert!(out.contains("a"));
        assert!(!out.contains("page"));
    }

    #[test]
    fn plain_strings_pass_through() {
        assert_eq!(
            formatter().format("web_fetch", &json!("  All done.  ")),
            "All done."
        );
    }

    #[test]
    fn unparseable_text_part_falls_back_to_raw_text() {
        let raw = json!({"content": [{"type": "image"}, {"type": "text", "text": "{not json"}]});
        assert_eq!(formatter().format("web_fetch", &raw), "{not json");
    }

    fn triple_encoded(text: &str) -> Value {
        let mut value = Value::String(text.to_string());
        for _ in 0..2 {
            value = Value::String(value.to_string());
        }
        value
    }

    #[test]
    fn deeply_encoded_strings_decode_fully() {
        let f = formatter();
        assert_eq!(f.format("web_fetch", &triple_encoded("x")), "x");
        assert_eq!(f.format("web_fetch", &triple_encoded("{\"a\":1}")), "**a:** 1");
    }

    #[test]
    fn formatting_is_idempotent() {
        let f = formatter();
        let inputs = [
            calendar_envelope(),
            json!({"id": "msg-1", "labelIds": ["SENT"], "threadId": "t-9"}),
            json!("plain words"),
            json!([]),
            json!("42"),
            json!("\"{\\\"a\\\":1}\""),
            triple_encoded("x"),
            triple_encoded("{\"a\":1}"),
            json!({"content": [{"type": "text", "text": "[object Object]"}]}),
        ];
        for raw in inputs {
            let once = f.format("google_calendar_list_events", &raw);
            let twice = f.format("google_calendar_list_events", &Value::String(once.clone()));
            assert_eq!(once, twice, "input: {raw}");
        }
    }

    #[test]
    fn json_with_markdown_characters_is_still_structured() {
        let out = formatter().format("notes_get", &json!("{\"title\": \"*draft*\"}"));
        assert!(out.starts_with("**title:**"));
    }

    #[test]
    fn corrupted_text_is_repaired_from_nested_payload() {
        let raw = json!({
            "content": [{"type": "text", "text": "[object Object]"}],
            "structuredContent": {"results": [{"summary": "Standup", "start": {"date": "2026-10-20"}}]}
        });
        let out = formatter().format("google_calendar_list_events", &raw);
        assert!(out.contains("Standup"));
        assert!(!out.contains(CORRUPTION_SIGNATURE));
    }

    #[test]
    fn unrepairable_corruption_shows_degraded_notice() {
        let raw = json!({"content": [{"type": "text", "text": "Result: [object Object]"}]});
        assert_eq!(formatter().format("web_fetch", &raw), DEGRADED_NOTICE);
    }

    #[test]
    fn record_formatting_depends_on_status() {
        let mut record = ExecutionRecord {
            tool_call_id: "t1".into(),
            chat_id: "c".into(),
            message_id: "m".into(),
            tool_name: "gmail_send_email".into(),
            tool_params: json!({}),
            status: ExecutionStatus::Running,
            result: None,
            error_message: None,
            created_at: 0,
            updated_at: 0,
        };
        let f = formatter();
        assert_eq!(f.format_record(&record), None);

        record.status = ExecutionStatus::Error;
        record.error_message = Some("quota exceeded".into());
        assert_eq!(
            f.format_record(&record).as_deref(),
            Some("**Error:** quota exceeded")
        );

        record.status = ExecutionStatus::Completed;
        record.result = Some(json!("Email sent."));
        assert_eq!(f.format_record(&record).as_deref(), Some("Email sent."));
    }

    #[test]
    fn markdown_detection() {
        assert!(looks_formatted("**Subject:** hi"));
        assert!(looks_formatted("1. first\n2. second"));
        assert!(looks_formatted("# Heading"));
        assert!(!looks_formatted("just words"));
        assert!(!looks_formatted(""));
    }
}
