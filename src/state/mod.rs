pub mod conversation;
pub mod ui_events;

pub use conversation::ConversationState;
pub use ui_events::reduce_ui_events;
