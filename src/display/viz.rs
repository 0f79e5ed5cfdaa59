/// Language tags rendered by structured widgets instead of plain code blocks.
/// A widget fed a half-streamed config errors or flashes, so blocks carrying
/// these tags are withheld until their closing fence arrives.
pub const VISUALIZATION_LANGUAGES: &[&str] =
    &["agchart", "aggrid", "mermaid", "map", "geomap", "deckgl"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    pub language: Option<String>,
    pub complete: bool,
    /// Byte offset of the opening fence marker.
    pub start: usize,
    /// Byte offset one past the closing fence marker, or the end of input
    /// for an unterminated block.
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationFilter {
    pub filtered_text: String,
    pub pending_language: Option<String>,
}

pub fn is_visualization_language(tag: &str) -> bool {
    let normalized = tag.to_ascii_lowercase();
    VISUALIZATION_LANGUAGES.contains(&normalized.as_str())
}

/// Greedy fence-pair scan: a block opens at a fence marker, takes the word
/// directly after it as its language tag, and closes at the next fence
/// marker or end of input (the latter marking it incomplete).
pub fn scan_fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut i = 0;

    while let Some(offset) = find_fence(bytes, i) {
        let start = offset;
        let mut cursor = offset + 3;

        let lang_start = cursor;
        while cursor < bytes.len() && is_word_byte(bytes[cursor]) {
            cursor += 1;
        }
        let language = if cursor > lang_start {
            Some(text[lang_start..cursor].to_string())
        } else {
            None
        };

        if cursor < bytes.len() && bytes[cursor] == b'\n' {
            cursor += 1;
        }

        let (end, complete) = match find_fence(bytes, cursor) {
            Some(close) => (close + 3, true),
            None => (bytes.len(), false),
        };

        blocks.push(FencedBlock {
            language,
            complete,
            start,
            end,
        });
        i = end;
    }

    blocks
}

fn find_fence(bytes: &[u8], from: usize) -> Option<usize> {
    if bytes.len() < 3 {
        return None;
    }
    (from..=bytes.len().saturating_sub(3))
        .find(|&i| bytes[i] == b'`' && bytes[i + 1] == b'`' && bytes[i + 2] == b'`')
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

pub fn has_incomplete_visualization_block(text: &str) -> bool {
    scan_fenced_blocks(text).iter().any(|block| {
        !block.complete
            && block
                .language
                .as_deref()
                .is_some_and(is_visualization_language)
    })
}

/// Strip every incomplete visualization block (fences, tag and content) and
/// report the pending language so the caller can show a placeholder.
/// Complete blocks and incomplete blocks of ordinary languages are left
/// untouched; plain code is fine to show mid-stream.
pub fn filter_incomplete_visualization_blocks(text: &str) -> VisualizationFilter {
    if text.is_empty() {
        return VisualizationFilter {
            filtered_text: String::new(),
            pending_language: None,
        };
    }

    let blocks = scan_fenced_blocks(text);
    let mut pending_language = None;
    let mut result = text.to_string();

    // Walk back to front so earlier spans keep their offsets.
    for block in blocks.iter().rev() {
        let Some(language) = block.language.as_deref() else {
            continue;
        };
        if block.complete || !is_visualization_language(language) {
            continue;
        }
        pending_language = Some(language.to_string());
        result.replace_range(block.start..block.end, "");
    }

    VisualizationFilter {
        filtered_text: result.trim().to_string(),
        pending_language,
    }
}
