use uuid::Uuid;

/// Chat id used when a tool call is shown outside a persisted conversation.
pub const UNSCOPED_CHAT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Namespace for deriving message ids from tool call ids.
const MESSAGE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a94_8d3e_4b57_a0c9_13e5_7b2d_f480);

/// Stable message id for a tool call; every mount of the same call lands on
/// the same record.
pub fn message_id_for(tool_call_id: &str) -> String {
    Uuid::new_v5(&MESSAGE_NAMESPACE, tool_call_id.as_bytes()).to_string()
}

/// Validate a chat id, substituting [`UNSCOPED_CHAT_ID`] when it is missing
/// or malformed.
pub fn normalize_chat_id(chat_id: Option<&str>) -> String {
    match chat_id.map(str::trim) {
        Some(id) if Uuid::parse_str(id).is_ok() => id.to_ascii_lowercase(),
        Some(id) => {
            tracing::debug!(chat_id = %id, "chat id failed format check; using unscoped id");
            UNSCOPED_CHAT_ID.to_string()
        }
        None => UNSCOPED_CHAT_ID.to_string(),
    }
}

/// Fresh id for a request synthesized without a usable marker id.
pub fn synthetic_tool_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_is_stable() {
        assert_eq!(message_id_for("abc123"), message_id_for("abc123"));
        assert_ne!(message_id_for("abc123"), message_id_for("abc124"));
        assert!(Uuid::parse_str(&message_id_for("abc123")).is_ok());
    }

    #[test]
    fn invalid_chat_ids_become_unscoped() {
        assert_eq!(normalize_chat_id(None), UNSCOPED_CHAT_ID);
        assert_eq!(normalize_chat_id(Some("")), UNSCOPED_CHAT_ID);
        assert_eq!(normalize_chat_id(Some("chat-42")), UNSCOPED_CHAT_ID);
    }

    #[test]
    fn valid_chat_ids_pass_through() {
        let id = "5E0B7C1A-2F33-4D4B-9E51-0A8C3F6D2B10";
        assert_eq!(
            normalize_chat_id(Some(id)),
            "5e0b7c1a-2f33-4d4b-9e51-0a8c3f6d2b10"
        );
    }

    #[test]
    fn synthetic_ids_are_unique() {
        let a = synthetic_tool_call_id();
        let b = synthetic_tool_call_id();
        assert!(a.starts_with("call_"));
        assert_ne!(a, b);
    }
}
