use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id prefix for client-synthesized messages (backfilled tool results).
/// Renderers skip any message whose id starts with this prefix.
pub const HIDDEN_MESSAGE_ID_PREFIX: &str = "do-not-render-";

const SYNTHETIC_TOOL_RESULT_TEXT: &str = "Successfully handled tool call.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Ai,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn human(text: &str, attachments: Vec<ContentBlock>) -> Self {
        let content = if attachments.is_empty() {
            Content::Text(text.to_string())
        } else {
            let mut blocks = Vec::with_capacity(attachments.len() + 1);
            if !text.trim().is_empty() {
                blocks.push(ContentBlock::Text {
                    text: text.to_string(),
                });
            }
            blocks.extend(attachments);
            Content::Blocks(blocks)
        };

        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Human,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Placeholder result for an assistant tool call the agent never answered.
    /// Hidden from rendering via its id prefix; exists only so the transport
    /// sees every tool call paired before the next human turn.
    pub fn synthetic_tool_result(tool_call_id: &str) -> Self {
        Self {
            id: format!("{HIDDEN_MESSAGE_ID_PREFIX}{}", Uuid::new_v4()),
            role: Role::Tool,
            content: Content::Text(SYNTHETIC_TOOL_RESULT_TEXT.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }

    /// Concatenated text portions of the content, ignoring attachment blocks.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.id.starts_with(HIDDEN_MESSAGE_ID_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        mime_type: String,
        data: String,
    },
    File {
        mime_type: String,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Auxiliary widget payload attached to the conversation by the agent,
/// distinct from message content. Keyed by id; later attach events with the
/// same id replace the entry, a remove event deletes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEvent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub props: serde_json::Value,
}

/// Custom frame payload from the run stream. Unrecognized shapes fold into
/// `Unknown` and are dropped without disturbing the rest of the stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum CustomEvent {
    #[serde(rename = "ui")]
    Attach {
        id: String,
        name: String,
        #[serde(default)]
        props: serde_json::Value,
    },
    #[serde(rename = "remove-ui")]
    Remove { id: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// One submission's worth of request data. Built once, immutable afterwards;
/// the request id keys the optimistic overlay until authoritative frames for
/// this run arrive.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub request_id: String,
    pub turns: Vec<Message>,
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
    pub checkpoint_id: Option<String>,
}

impl RunRequest {
    pub fn new(
        turns: Vec<Message>,
        context: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            turns,
            context,
            checkpoint_id: None,
        }
    }

    /// Recompute from an existing checkpoint: no new turns are appended.
    pub fn regenerate(checkpoint_id: &str) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
            context: None,
            checkpoint_id: Some(checkpoint_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Full conversation state as the server sees it. Replaces local state
/// wholesale when received; this is the authoritative reconciliation path.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub ui: Vec<UiEvent>,
}

/// One decoded unit of the run stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Metadata(RunMetadata),
    Values(StateSnapshot),
    MessagesPartial(Vec<Message>),
    MessagesComplete(Vec<Message>),
    Custom(CustomEvent),
    Error { message: String },
    End,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_round_trip_serialization() {
        let message = Message {
            id: "msg_1".to_string(),
            role: Role::Ai,
            content: Content::Text("hello".to_string()),
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "lookup".to_string(),
                args: json!({"q": "x"}),
            }],
            tool_call_id: None,
        };
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_message_text_skips_attachment_blocks() {
        let message = Message {
            id: "msg_2".to_string(),
            role: Role::Human,
            content: Content::Blocks(vec![
                ContentBlock::Text {
                    text: "see chart".to_string(),
                },
                ContentBlock::Image {
                    mime_type: "image/png".to_string(),
                    data: "aGk=".to_string(),
                },
            ]),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        assert_eq!(message.text(), "see chart");
    }

    #[test]
    fn test_synthetic_tool_result_is_hidden() {
        let result = Message::synthetic_tool_result("call_9");
        assert!(result.is_hidden());
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("call_9"));
    }

    #[test]
    fn test_custom_event_unknown_shape_folds_to_unknown() {
        let event: CustomEvent =
            serde_json::from_value(json!({"type": "telemetry", "payload": 1})).unwrap();
        assert_eq!(event, CustomEvent::Unknown);
    }

    #[test]
    fn test_custom_event_attach_defaults_missing_props() {
        let event: CustomEvent =
            serde_json::from_value(json!({"type": "ui", "id": "w1", "name": "chart"})).unwrap();
        match event {
            CustomEvent::Attach { id, name, props } => {
                assert_eq!(id, "w1");
                assert_eq!(name, "chart");
                assert_eq!(props, serde_json::Value::Null);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
