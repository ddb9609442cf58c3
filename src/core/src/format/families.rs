use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use crate::family::ToolFamily;

const NO_RESULTS: &str = "No results.";
const HTML_WRAP_WIDTH: usize = 100;

/// Renders the payload of one tool family.
///
/// Returning `None` hands the value to the generic renderer.
pub trait FamilyFormatter: Send + Sync {
    fn render(&self, value: &Value) -> Option<String>;
}

/// Family to renderer lookup with a generic fallback.
pub struct FormatterRegistry {
    formatters: HashMap<ToolFamily, Box<dyn FamilyFormatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self {
            formatters: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ToolFamily::Mail, MailFormatter);
        registry.register(ToolFamily::Calendar, CalendarFormatter);
        registry
    }

    pub fn register(&mut self, family: ToolFamily, formatter: impl FamilyFormatter + 'static) {
        self.formatters.insert(family, Box::new(formatter));
    }

    pub fn render(&self, family: ToolFamily, value: &Value) -> String {
        self.formatters
            .get(&family)
            .and_then(|formatter| formatter.render(value))
            .unwrap_or_else(|| render_generic(value))
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Key/value rendering for payloads no family claims.
pub fn render_generic(value: &Value) -> String {
    let mut lines = Vec::new();
    render_into(value, 0, &mut lines);
    if lines.is_empty() {
        NO_RESULTS.to_string()
    } else {
        lines.join("\n")
    }
}

fn render_into(value: &Value, indent: usize, lines: &mut Vec<String>) {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                match item {
                    Value::Null => {}
                    Value::Object(_) | Value::Array(_) => {
                        lines.push(format!("{pad}**{key}:**"));
                        render_into(item, indent + 3, lines);
                    }
                    scalar => lines.push(format!("{pad}**{key}:** {}", scalar_text(scalar))),
                }
            }
        }
        Value::Array(items) if items.is_empty() => lines.push(format!("{pad}{NO_RESULTS}")),
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let bullet = format!("{}. ", idx + 1);
                if item.is_object() || item.is_array() {
                    let mut nested = Vec::new();
                    render_into(item, 0, &mut nested);
                    for (line_idx, line) in nested.iter().enumerate() {
                        if line_idx == 0 {
                            lines.push(format!("{pad}{bullet}{line}"));
                        } else {
                            lines.push(format!("{pad}   {line}"));
                        }
                    }
                } else {
                    lines.push(format!("{pad}{bullet}{}", scalar_text(item)));
                }
            }
        }
        Value::Null => {}
        scalar => lines.push(format!("{pad}{}", scalar_text(scalar))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn text_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Human form of an RFC 3339, RFC 2822 or plain date; unknown shapes pass through.
pub(crate) fn display_time(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return at.format("%a %b %-d, %Y %H:%M").to_string();
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
        return at.format("%a %b %-d, %Y %H:%M").to_string();
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return day.format("%a %b %-d, %Y").to_string();
    }
    raw.to_string()
}

fn html_to_text(body: &str) -> String {
    if body.contains('<') && body.contains('>') {
        html2text::from_read(body.as_bytes(), HTML_WRAP_WIDTH)
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|_| body.trim().to_string())
    } else {
        body.trim().to_string()
    }
}

pub struct MailFormatter;

impl MailFormatter {
    fn is_message(obj: &Map<String, Value>) -> bool {
        ["subject", "from", "sender", "snippet"]
            .iter()
            .any(|key| obj.contains_key(*key))
    }

    fn summary(obj: &Map<String, Value>) -> Vec<String> {
        let subject = text_field(obj, &["subject"]).unwrap_or("(no subject)");
        let mut lines = vec![format!("**{subject}**")];
        let from = text_field(obj, &["from", "sender"]);
        let date = text_field(obj, &["date", "receivedAt"]).map(display_time);
        match (from, date) {
            (Some(from), Some(date)) => lines.push(format!("From {from}, {date}")),
            (Some(from), None) => lines.push(format!("From {from}")),
            (None, Some(date)) => lines.push(date),
            (None, None) => {}
        }
        if let Some(snippet) = text_field(obj, &["snippet", "preview"]) {
            lines.push(html_to_text(snippet));
        }
        lines
    }

    fn detail(obj: &Map<String, Value>) -> String {
        let mut lines = Vec::new();
        for (label, keys) in [
            ("From", &["from", "sender"][..]),
            ("To", &["to"][..]),
            ("Date", &["date", "receivedAt"][..]),
            ("Subject", &["subject"][..]),
        ] {
            if let Some(value) = text_field(obj, keys) {
                let value = if label == "Date" {
                    display_time(value)
                } else {
                    value.to_string()
                };
                lines.push(format!("**{label}:** {value}"));
            }
        }
        if let Some(body) = text_field(obj, &["body", "messageText", "snippet"]) {
            lines.push(String::new());
            lines.push(html_to_text(body));
        }
        lines.join("\n")
    }

    fn list(items: &[Value]) -> Option<String> {
        if items.is_empty() {
            return Some("No messages found.".to_string());
        }
        let messages: Vec<&Map<String, Value>> =
            items.iter().filter_map(Value::as_object).collect();
        if messages.len() != items.len() || !messages.iter().any(|m| Self::is_message(m)) {
            return None;
        }
        let mut lines = Vec::new();
        for (idx, message) in messages.iter().enumerate() {
            for (line_idx, line) in Self::summary(message).into_iter().enumerate() {
                if line_idx == 0 {
                    lines.push(format!("{}. {line}", idx + 1));
                } else {
                    lines.push(format!("   {line}"));
                }
            }
        }
        Some(lines.join("\n"))
    }
}

impl FamilyFormatter for MailFormatter {
    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Array(items) => Self::list(items),
            Value::Object(obj) => match obj.get("messages") {
                Some(Value::Array(items)) => Self::list(items),
                _ if Self::is_message(obj) => Some(Self::detail(obj)),
                _ => None,
            },
            _ => None,
        }
    }
}

pub struct CalendarFormatter;

impl CalendarFormatter {
    fn is_event(obj: &Map<String, Value>) -> bool {
        (obj.contains_key("summary") || obj.contains_key("title")) && obj.contains_key("start")
    }

    fn event_time(value: Option<&Value>) -> Option<String> {
        let raw = match value? {
            Value::String(s) => s.as_str(),
            Value::Object(obj) => text_field(obj, &["dateTime", "date"])?,
            _ => return None,
        };
        Some(display_time(raw))
    }

    fn event_lines(obj: &Map<String, Value>) -> Vec<String> {
        let title = text_field(obj, &["summary", "title"]).unwrap_or("(untitled event)");
        let mut lines = vec![format!("**{title}**")];
        let start = Self::event_time(obj.get("start"));
        let end = Self::event_time(obj.get("end"));
        match (start, end) {
            (Some(start), Some(end)) => lines.push(format!("{start} to {end}")),
            (Some(start), None) => lines.push(start),
            _ => {}
        }
        if let Some(location) = text_field(obj, &["location"]) {
            lines.push(format!("Location: {location}"));
        }
        lines
    }

    fn list(items: &[Value]) -> Option<String> {
        if items.is_empty() {
            return Some("No events found.".to_string());
        }
        let events: Vec<&Map<String, Value>> =
            items.iter().filter_map(Value::as_object).collect();
        if events.len() != items.len() || !events.iter().all(|e| Self::is_event(e)) {
            return None;
        }
        let mut lines = Vec::new();
        for (idx, event) in events.iter().enumerate() {
            for (line_idx, line) in Self::event_lines(event).into_iter().enumerate() {
                if line_idx == 0 {
                    lines.push(format!("{}. {line}", idx + 1));
                } else {
                    lines.push(format!("   {line}"));
                }
            }
        }
        Some(lines.join("\n"))
    }
}

impl FamilyFormatter for CalendarFormatter {
    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Array(items) => Self::list(items),
            Value::Object(obj) => match obj.get("items") {
                Some(Value::Array(items)) => Self::list(items),
                _ if Self::is_event(obj) => Some(Self::event_lines(obj).join("\n")),
                _ => None,
            },
            _ => None,
        }
    }
}
