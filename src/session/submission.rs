use crate::types::{ContentBlock, Message, Role};
use std::collections::HashSet;

/// A submission needs either non-blank text or at least one attachment.
pub fn has_submittable_content(text: &str, attachments: &[ContentBlock]) -> bool {
    !text.trim().is_empty() || !attachments.is_empty()
}

/// Synthetic results for assistant tool calls the transcript never answered.
/// The transport rejects a new human turn while a tool call dangles, so the
/// gap is repaired locally instead of bouncing the submission; the results
/// are ordered by the calls' appearance in history and must precede the new
/// human turn in the request.
pub fn missing_tool_results(messages: &[Message]) -> Vec<Message> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .filter_map(|message| message.tool_call_id.as_deref())
        .collect();

    let mut repairs = Vec::new();
    for message in messages {
        if message.role != Role::Ai {
            continue;
        }
        for call in &message.tool_calls {
            if !answered.contains(call.id.as_str()) {
                repairs.push(Message::synthetic_tool_result(&call.id));
            }
        }
    }
    repairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Content, ToolCall};
    use serde_json::json;

    fn ai_with_calls(id: &str, calls: &[&str]) -> Message {
        Message {
            id: id.to_string(),
            role: Role::Ai,
            content: Content::Text("working on it".to_string()),
            tool_calls: calls
                .iter()
                .map(|call_id| ToolCall {
                    id: call_id.to_string(),
                    name: "search".to_string(),
                    args: json!({}),
                })
                .collect(),
            tool_call_id: None,
        }
    }

    fn tool_result(id: &str, call_id: &str) -> Message {
        Message {
            id: id.to_string(),
            role: Role::Tool,
            content: Content::Text("result".to_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
        }
    }

    #[test]
    fn test_submittable_content_requires_text_or_attachment() {
        assert!(!has_submittable_content("", &[]));
        assert!(!has_submittable_content("   \n", &[]));
        assert!(has_submittable_content("hi", &[]));
        assert!(has_submittable_content(
            "",
            &[ContentBlock::Image {
                mime_type: "image/png".to_string(),
                data: "aGk=".to_string(),
            }]
        ));
    }

    #[test]
    fn test_unanswered_call_gets_synthetic_result() {
        let history = vec![ai_with_calls("a1", &["t1"])];
        let repairs = missing_tool_results(&history);
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].role, Role::Tool);
        assert_eq!(repairs[0].tool_call_id.as_deref(), Some("t1"));
        assert!(repairs[0].is_hidden(), "backfill must not render");
    }

    #[test]
    fn test_answered_call_is_left_alone() {
        let history = vec![ai_with_calls("a1", &["t1"]), tool_result("r1", "t1")];
        assert!(missing_tool_results(&history).is_empty());
    }

    #[test]
    fn test_mixed_history_repairs_only_gaps_in_order() {
        let history = vec![
            ai_with_calls("a1", &["t1", "t2"]),
            tool_result("r1", "t1"),
            ai_with_calls("a2", &["t3"]),
        ];
        let repairs = missing_tool_results(&history);
        assert_eq!(repairs.len(), 2);
        assert_eq!(repairs[0].tool_call_id.as_deref(), Some("t2"));
        assert_eq!(repairs[1].tool_call_id.as_deref(), Some("t3"));
    }

    #[test]
    fn test_history_without_tool_calls_needs_no_repair() {
        let history = vec![Message::human("hello", Vec::new())];
        assert!(missing_tool_results(&history).is_empty());
    }
}
