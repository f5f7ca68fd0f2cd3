//! Apply-to-buffer logic, isolated behind a trait.
//!
//! The relay protocol is agnostic to how edits merge; clients today apply
//! whatever arrives, in arrival order (last delivered wins). Keeping the
//! buffer behind `EditBuffer` means a convergent CRDT/OT engine can be
//! substituted later without touching the protocol or the client core.

use crate::models::Change;

/// A local editor buffer that changes are applied to.
pub trait EditBuffer {
    /// Apply one change at its stated position. Implementations must never
    /// panic on out-of-range positions; the relay makes no effort to keep
    /// concurrent edits consistent.
    fn apply(&mut self, change: &Change);

    /// Current buffer contents.
    fn contents(&self) -> &str;
}

/// Plain last-delivered-wins text buffer over character offsets.
#[derive(Debug, Default)]
pub struct PlainTextBuffer {
    text: String,
}

impl PlainTextBuffer {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            text: initial.into(),
        }
    }

    /// Byte offset for a character position, clamped to the buffer end.
    fn byte_offset(&self, char_pos: u64) -> usize {
        self.text
            .char_indices()
            .nth(char_pos as usize)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len())
    }

    fn remove_chars(&mut self, char_pos: u64, count: usize) {
        let start = self.byte_offset(char_pos);
        let end = self.byte_offset(char_pos + count as u64);
        self.text.replace_range(start..end, "");
    }
}

impl EditBuffer for PlainTextBuffer {
    fn apply(&mut self, change: &Change) {
        let position = change.position.unwrap_or(0);
        match change.change_type.as_str() {
            "insert" => {
                if let Some(content) = &change.content {
                    let at = self.byte_offset(position);
                    self.text.insert_str(at, content);
                }
            }
            "delete" => {
                let count = change
                    .previous_content
                    .as_ref()
                    .map(|s| s.chars().count())
                    .unwrap_or(0);
                self.remove_chars(position, count);
            }
            "replace" => {
                let count = change
                    .previous_content
                    .as_ref()
                    .map(|s| s.chars().count())
                    .unwrap_or(0);
                self.remove_chars(position, count);
                if let Some(content) = &change.content {
                    let at = self.byte_offset(position);
                    self.text.insert_str(at, content);
                }
            }
            // The tag set is open; unknown kinds are skipped rather than
            // guessed at.
            other => {
                tracing::warn!("Skipping change with unknown type '{}'", other);
            }
        }
    }

    fn contents(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: &str, position: u64, content: Option<&str>, previous: Option<&str>) -> Change {
        Change {
            participant_id: "1".into(),
            book_id: "10".into(),
            chapter_id: None,
            change_type: kind.into(),
            position: Some(position),
            content: content.map(str::to_string),
            previous_content: previous.map(str::to_string),
            timestamp: None,
        }
    }

    #[test]
    fn insert_at_offset() {
        let mut buffer = PlainTextBuffer::new("hello world");
        buffer.apply(&change("insert", 5, Some(","), None));
        assert_eq!(buffer.contents(), "hello, world");
    }

    #[test]
    fn delete_removes_superseded_text() {
        let mut buffer = PlainTextBuffer::new("hello cruel world");
        buffer.apply(&change("delete", 6, None, Some("cruel ")));
        assert_eq!(buffer.contents(), "hello world");
    }

    #[test]
    fn replace_swaps_span() {
        let mut buffer = PlainTextBuffer::new("draft one");
        buffer.apply(&change("replace", 6, Some("two"), Some("one")));
        assert_eq!(buffer.contents(), "draft two");
    }

    #[test]
    fn out_of_range_position_clamps_to_end() {
        let mut buffer = PlainTextBuffer::new("ab");
        buffer.apply(&change("insert", 99, Some("c"), None));
        assert_eq!(buffer.contents(), "abc");
    }

    #[test]
    fn multibyte_offsets_are_character_based() {
        let mut buffer = PlainTextBuffer::new("héllo");
        buffer.apply(&change("insert", 2, Some("y"), None));
        assert_eq!(buffer.contents(), "héyllo");
    }

    #[test]
    fn unknown_change_type_is_ignored() {
        let mut buffer = PlainTextBuffer::new("stable");
        buffer.apply(&change("annotate", 0, Some("x"), None));
        assert_eq!(buffer.contents(), "stable");
    }
}
