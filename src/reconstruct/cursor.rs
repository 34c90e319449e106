//! Ordered consumption of a page's text elements during token rewrite.

use crate::model::TextElement;

/// Cursor over text elements in content order.
#[derive(Debug, Clone)]
pub struct TextElementCursor<'a> {
    elements: &'a [TextElement],
    index: usize,
}

impl<'a> TextElementCursor<'a> {
    pub fn new(elements: &'a [TextElement]) -> Self {
        Self { elements, index: 0 }
    }

    /// Consume elements covering `glyph_count` glyphs, all set in
    /// `expected_font_id` (an empty id matches any font).
    ///
    /// Returns `None` when the elements run out or a font does not match;
    /// the cursor is left where it was.
    pub fn consume(&mut self, expected_font_id: &str, glyph_count: usize) -> Option<&'a [TextElement]> {
        if glyph_count == 0 {
            return Some(&[]);
        }
        let start = self.index;
        let mut index = start;
        let mut remaining = glyph_count as isize;
        while remaining > 0 {
            let element = self.elements.get(index)?;
            if !font_matches(expected_font_id, element.font_id.as_deref()) {
                log::debug!(
                    "Font mismatch at element {}: expected {}, found {:?}",
                    index,
                    expected_font_id,
                    element.font_id
                );
                return None;
            }
            remaining -= element.codepoint_count().max(1) as isize;
            index += 1;
        }
        self.index = index;
        Some(&self.elements[start..index])
    }

    /// Elements not consumed yet.
    pub fn remaining(&self) -> usize {
        self.elements.len() - self.index
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.index
    }
}

fn font_matches(expected: &str, actual: Option<&str>) -> bool {
    if expected.is_empty() {
        return true;
    }
    actual.is_some_and(|a| a == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements() -> Vec<TextElement> {
        vec![
            TextElement::new("He", "F1"),
            TextElement::new("llo", "F1"),
            TextElement::new("World", "F2"),
        ]
    }

    #[test]
    fn test_consume_by_glyph_count() {
        let elements = elements();
        let mut cursor = TextElementCursor::new(&elements);
        let first = cursor.consume("F1", 5).unwrap();
        assert_eq!(first.len(), 2);
        let second = cursor.consume("F2", 5).unwrap();
        assert_eq!(second[0].text, "World");
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_font_mismatch_leaves_cursor_in_place() {
        let elements = elements();
        let mut cursor = TextElementCursor::new(&elements);
        assert!(cursor.consume("F2", 2).is_none());
        assert_eq!(cursor.position(), 0);
        assert!(cursor.consume("F1", 2).is_some());
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn test_running_out_fails() {
        let elements = elements();
        let mut cursor = TextElementCursor::new(&elements);
        assert!(cursor.consume("", 20).is_none());
        assert_eq!(cursor.consume("", 0).map(<[TextElement]>::len), Some(0));
    }

    #[test]
    fn test_missing_font_id_never_matches() {
        let mut element = TextElement::new("x", "F1");
        element.font_id = None;
        let elements = [element];
        let mut cursor = TextElementCursor::new(&elements);
        assert!(cursor.consume("F1", 1).is_none());
        assert!(cursor.consume("", 1).is_some());
    }
}
