use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Outcome class of a tool invocation as shown in the transcript. `Blocked`
/// marks calls a guardrail refused; `Error` marks calls that were attempted
/// or rejected in a user-correctable way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
    Blocked,
}

/// Status metadata attached to tool-result messages so the presentation
/// layer can distinguish outcomes without parsing content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatusMeta {
    pub label: String,
    pub status: ToolStatus,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A single tool invocation requested by the model. `name` is the
/// provider-safe name; `arguments` is the raw JSON string exactly as the
/// provider returned it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One turn of the conversation. Within any retained window, a `tool`
/// message is always preceded by the `assistant` message that requested it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ToolStatusMeta>,
}

impl Message {
    fn bare(role: MessageRole, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            meta: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::bare(MessageRole::System, Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(MessageRole::User, Some(content.into()))
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::bare(MessageRole::Assistant, Some(content.into()))
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self { tool_calls, ..Self::bare(MessageRole::Assistant, content) }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        meta: ToolStatusMeta,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            meta: Some(meta),
        }
    }

    /// System-visible note appended by the runtime itself, e.g. side-effect
    /// failure reports.
    pub fn system_note(content: impl Into<String>) -> Self {
        Self::bare(MessageRole::System, Some(content.into()))
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|content| !content.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use crate::conversation::{Message, MessageRole, ToolCallRequest, ToolStatus, ToolStatusMeta};

    #[test]
    fn assistant_message_may_carry_tool_calls_without_text() {
        let message = Message::assistant_tool_calls(
            None,
            vec![ToolCallRequest {
                id: "call-1".to_string(),
                name: "estimates_getProjectDetail".to_string(),
                arguments: "{}".to_string(),
            }],
        );
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(message.has_tool_calls());
        assert!(message.text().is_none());
    }

    #[test]
    fn blank_content_is_not_text() {
        let message = Message::assistant_text("   ");
        assert!(message.text().is_none());
        assert!(Message::assistant_text("done").text().is_some());
    }

    #[test]
    fn tool_result_links_back_to_its_call() {
        let message = Message::tool_result(
            "call-7",
            "roles.list",
            "[]",
            ToolStatusMeta {
                label: "roles.list".to_string(),
                status: ToolStatus::Success,
                summary: "Listed 0 roles".to_string(),
                detail: None,
            },
        );
        assert_eq!(message.tool_call_id.as_deref(), Some("call-7"));
        assert_eq!(message.meta.as_ref().map(|meta| meta.status), Some(ToolStatus::Success));
    }

    #[test]
    fn serialization_omits_empty_optional_fields() {
        let serialized =
            serde_json::to_string(&Message::user("hello")).expect("message should serialize");
        assert!(!serialized.contains("tool_calls"));
        assert!(!serialized.contains("meta"));
        assert!(serialized.contains("\"role\":\"user\""));
    }
}
