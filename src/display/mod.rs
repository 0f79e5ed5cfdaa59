pub mod pool;
pub mod safety;
pub mod typing;
pub mod viz;

pub use pool::{WidgetPool, WidgetSlot};
pub use typing::TypingAnimator;

use self::viz::filter_incomplete_visualization_blocks;
use std::time::Duration;

/// Render-ready projection of one streaming assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextView {
    pub displayed_text: String,
    pub pending_language: Option<String>,
    pub is_typing: bool,
}

/// Ephemeral display state for the in-flight assistant message: the typing
/// cursor plus the derived pending-visualization language. Discard it when
/// the message finalizes or a new one takes the display slot.
pub struct StreamingTextBuffer {
    animator: TypingAnimator,
}

impl StreamingTextBuffer {
    pub fn new(speed: Duration, enabled: bool) -> Self {
        Self {
            animator: TypingAnimator::new(speed, enabled),
        }
    }

    /// Feed the latest known full text for the message.
    pub fn update(&mut self, full_text: &str) {
        self.animator.set_text(full_text);
    }

    /// Advance one frame; returns true on the tick the typing session ends.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        self.animator.advance(elapsed)
    }

    pub fn full_text(&self) -> &str {
        self.animator.full_text()
    }

    pub fn view(&self) -> TextView {
        let shown = self.animator.displayed_text();
        let filtered = filter_incomplete_visualization_blocks(shown);
        TextView {
            displayed_text: filtered.filtered_text,
            pending_language: filtered.pending_language,
            is_typing: self.animator.is_typing(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.animator.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: Duration = Duration::from_millis(10);

    #[test]
    fn test_view_combines_typing_and_visualization_filter() {
        let mut buffer = StreamingTextBuffer::new(SPEED, false);
        buffer.update("here:\n```map\n{\"zoom\":");
        buffer.advance(SPEED);

        let view = buffer.view();
        assert_eq!(view.displayed_text, "here:");
        assert_eq!(view.pending_language.as_deref(), Some("map"));
        assert!(!view.is_typing);
    }

    #[test]
    fn test_view_typing_progression() {
        let mut buffer = StreamingTextBuffer::new(SPEED, true);
        buffer.update("hi there");
        buffer.advance(SPEED * 2);

        let view = buffer.view();
        assert_eq!(view.displayed_text, "hi");
        assert!(view.is_typing);
        assert!(!buffer.is_complete());
    }

    #[test]
    fn test_completed_plain_text_view() {
        let mut buffer = StreamingTextBuffer::new(SPEED, true);
        buffer.update("done");
        buffer.advance(SPEED * 10);

        let view = buffer.view();
        assert_eq!(view.displayed_text, "done");
        assert_eq!(view.pending_language, None);
        assert!(!view.is_typing);
        assert!(buffer.is_complete());
    }
}
