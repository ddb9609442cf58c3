/// In-band token announcing that a tool call needs user approval.
///
/// Producers embed `__REQUIRES_APPROVAL__:<toolCallId>:<toolName>` in an
/// otherwise plain-text assistant message.
pub const APPROVAL_SENTINEL: &str = "__REQUIRES_APPROVAL__";

/// Characters that terminate an id or name token inside a marker.
pub const MARKER_TOKEN_DELIMITERS: &[char] = &[':', ',', '}', '"'];

/// Build the in-band marker for a tool call.
pub fn encode_marker(tool_call_id: &str, tool_name: &str) -> String {
    format!("{APPROVAL_SENTINEL}:{tool_call_id}:{tool_name}")
}

/// Whether `c` ends a marker token.
pub fn is_marker_delimiter(c: char) -> bool {
    c.is_whitespace() || MARKER_TOKEN_DELIMITERS.contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_id_and_name() {
        assert_eq!(
            encode_marker("abc123", "gmail_send_email"),
            "__REQUIRES_APPROVAL__:abc123:gmail_send_email"
        );
    }

    #[test]
    fn delimiters_cover_marker_grammar() {
        for c in [':', ',', '}', '"', ' ', '\n', '\t'] {
            assert!(is_marker_delimiter(c), "{c:?}");
        }
        assert!(!is_marker_delimiter('_'));
        assert!(!is_marker_delimiter('-'));
    }
}
