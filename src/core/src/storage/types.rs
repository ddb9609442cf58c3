use serde::{Deserialize, Serialize};

/// Identity of one displayed tool result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayKey {
    pub chat_id: String,
    pub message_id: String,
    pub tool_call_id: String,
}

impl DisplayKey {
    pub fn new(
        chat_id: impl Into<String>,
        message_id: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

/// Rendering-time capture attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderMarker {
    pub message_id: String,
    pub tool_call_id: String,
    pub text: String,
    pub created_at: u64,
}
