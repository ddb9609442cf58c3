use serde_json::{json, Map, Value};

use crate::family::ToolKind;

pub(crate) const MAIL_SEARCH_DEFAULT_QUERY: &str = "in:inbox";
const DEFAULT_MAX_RESULTS: u64 = 10;

/// Minimal argument set shown in the approval preview before the model has
/// supplied real arguments. Unknown tools get an empty map.
pub fn default_args(tool_name: &str) -> Map<String, Value> {
    let value = match ToolKind::classify(tool_name) {
        ToolKind::MailSearch => json!({
            "query": MAIL_SEARCH_DEFAULT_QUERY,
            "max_results": DEFAULT_MAX_RESULTS,
        }),
        ToolKind::MailCompose => json!({
            "to": "",
            "subject": "",
            "body": "",
        }),
        ToolKind::CalendarQuery => json!({
            "calendar_id": "primary",
            "max_results": DEFAULT_MAX_RESULTS,
        }),
        ToolKind::Unknown => return Map::new(),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_tools_get_blank_envelope() {
        let args = default_args("gmail_send_email");
        assert_eq!(Value::Object(args), json!({"to": "", "subject": "", "body": ""}));
    }

    #[test]
    fn search_tools_get_generic_query() {
        let args = default_args("gmail_search_emails");
        assert_eq!(args.get("query"), Some(&json!("in:inbox")));
    }

    #[test]
    fn calendar_queries_target_primary() {
        let args = default_args("google_calendar_list_events");
        assert_eq!(args.get("calendar_id"), Some(&json!("primary")));
    }

    #[test]
    fn unknown_tools_stay_empty() {
        assert!(default_args("web_fetch").is_empty());
    }
}
