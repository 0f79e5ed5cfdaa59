use super::ui_events::reduce_ui_events;
use crate::types::{CustomEvent, Message, Role, StateSnapshot, UiEvent};

/// Conversation state owned by the stream session: the message transcript,
/// the attached UI events, and the run-level loading/error flags. Single
/// writer; the rendering layer only ever reads snapshots.
#[derive(Default)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub ui_events: Vec<UiEvent>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a message by id: replace an existing entry in place, append a
    /// new one. Returns true when the stored message actually changed, which
    /// is what rearms the quiet-window completion timer.
    pub fn upsert_message(&mut self, message: Message) -> bool {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            if *existing == message {
                return false;
            }
            *existing = message;
            return true;
        }
        self.messages.push(message);
        true
    }

    /// Adopt an authoritative server snapshot wholesale.
    pub fn replace_from_snapshot(&mut self, snapshot: StateSnapshot) {
        self.messages = snapshot.messages;
        self.ui_events = snapshot.ui;
    }

    pub fn apply_custom_event(&mut self, event: &CustomEvent) {
        reduce_ui_events(&mut self.ui_events, event);
    }

    pub fn latest_ai_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Ai)
    }

    /// Drop the checkpoint message and everything after it, in preparation
    /// for regenerating from that point. Returns false when the checkpoint
    /// id is not in the transcript.
    pub fn truncate_from_checkpoint(&mut self, checkpoint_id: &str) -> bool {
        match self.messages.iter().position(|m| m.id == checkpoint_id) {
            Some(index) => {
                self.messages.truncate(index);
                true
            }
            None => false,
        }
    }

    /// Transcript with client-synthesized bookkeeping messages filtered out.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_hidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;

    fn message(id: &str, role: Role, text: &str) -> Message {
        Message {
            id: id.to_string(),
            role,
            content: Content::Text(text.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    #[test]
    fn test_upsert_appends_then_replaces() {
        let mut state = ConversationState::new();
        assert!(state.upsert_message(message("m1", Role::Ai, "He")));
        assert!(state.upsert_message(message("m1", Role::Ai, "Hello")));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].text(), "Hello");
    }

    #[test]
    fn test_upsert_identical_message_reports_no_change() {
        let mut state = ConversationState::new();
        state.upsert_message(message("m1", Role::Ai, "Hello"));
        assert!(
            !state.upsert_message(message("m1", Role::Ai, "Hello")),
            "identical content must not count as a change"
        );
    }

    #[test]
    fn test_truncate_from_checkpoint_drops_tail() {
        let mut state = ConversationState::new();
        state.upsert_message(message("h1", Role::Human, "question"));
        state.upsert_message(message("a1", Role::Ai, "first answer"));
        state.upsert_message(message("h2", Role::Human, "follow-up"));

        assert!(state.truncate_from_checkpoint("a1"));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].id, "h1");
    }

    #[test]
    fn test_truncate_unknown_checkpoint_is_noop() {
        let mut state = ConversationState::new();
        state.upsert_message(message("h1", Role::Human, "question"));
        assert!(!state.truncate_from_checkpoint("missing"));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_visible_messages_skips_hidden_ids() {
        let mut state = ConversationState::new();
        state.upsert_message(message("h1", Role::Human, "question"));
        state.upsert_message(Message::synthetic_tool_result("call_1"));

        let visible: Vec<_> = state.visible_messages().collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "h1");
    }

    #[test]
    fn test_latest_ai_message() {
        let mut state = ConversationState::new();
        assert!(state.latest_ai_message().is_none());
        state.upsert_message(message("h1", Role::Human, "q"));
        state.upsert_message(message("a1", Role::Ai, "one"));
        state.upsert_message(message("a2", Role::Ai, "two"));
        assert_eq!(state.latest_ai_message().map(|m| m.id.as_str()), Some("a2"));
    }
}
