use serde::{Deserialize, Serialize};

/// Coarse grouping of tool providers by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFamily {
    Mail,
    Calendar,
    Other,
}

/// What a tool in a family does, as far as argument defaults care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    MailSearch,
    MailCompose,
    CalendarQuery,
    Unknown,
}

impl ToolFamily {
    pub fn classify(tool_name: &str) -> Self {
        let name = tool_name.to_ascii_lowercase();
        if name.contains("calendar") {
            Self::Calendar
        } else if name.contains("mail") || name.contains("gmail") || name.contains("outlook") {
            Self::Mail
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Calendar => "calendar",
            Self::Other => "other",
        }
    }
}

impl ToolKind {
    pub fn classify(tool_name: &str) -> Self {
        let name = tool_name.to_ascii_lowercase();
        match ToolFamily::classify(&name) {
            ToolFamily::Mail => {
                if ["search", "list_messages", "find_emails", "fetch_emails"]
                    .iter()
                    .any(|k| name.contains(k))
                {
                    Self::MailSearch
                } else if ["send", "draft", "reply", "compose"]
                    .iter()
                    .any(|k| name.contains(k))
                {
                    Self::MailCompose
                } else {
                    Self::Unknown
                }
            }
            ToolFamily::Calendar => {
                if ["list", "get", "find", "search", "query", "events"]
                    .iter()
                    .any(|k| name.contains(k))
                {
                    Self::CalendarQuery
                } else {
                    Self::Unknown
                }
            }
            ToolFamily::Other => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_families() {
        assert_eq!(ToolFamily::classify("gmail_send_email"), ToolFamily::Mail);
        assert_eq!(
            ToolFamily::classify("GOOGLE_CALENDAR_LIST_EVENTS"),
            ToolFamily::Calendar
        );
        assert_eq!(ToolFamily::classify("web_search"), ToolFamily::Other);
    }

    #[test]
    fn classifies_kinds() {
        assert_eq!(ToolKind::classify("gmail_search_emails"), ToolKind::MailSearch);
        assert_eq!(ToolKind::classify("gmail_send_email"), ToolKind::MailCompose);
        assert_eq!(ToolKind::classify("gmail_create_draft"), ToolKind::MailCompose);
        assert_eq!(
            ToolKind::classify("google_calendar_list_events"),
            ToolKind::CalendarQuery
        );
        assert_eq!(
            ToolKind::classify("google_calendar_create_event"),
            ToolKind::Unknown
        );
        assert_eq!(ToolKind::classify("web_search"), ToolKind::Unknown);
    }
}
