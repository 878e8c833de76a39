//! Left-to-right regex scanner
//!
//! Walks a cursor over the original input. Every match consumes its span, so
//! text is never matched twice, and offsets always refer to the original
//! input rather than a shrinking remainder.

use regex::Regex;

/// Non-empty match, as char offsets into the scanned text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span<'t> {
    pub start: usize,
    pub end: usize,
    pub source: &'t str,
}

/// Find every non-overlapping, non-empty match of `regex` in `text`.
///
/// Zero-length matches are never reported; the cursor steps one char past
/// them so the scan always terminates.
pub fn scan<'t>(regex: &Regex, text: &'t str) -> Vec<Span<'t>> {
    let mut spans = Vec::new();
    let mut chars = CharIndexer::new(text);
    let mut cursor = 0;

    while cursor <= text.len() {
        let Some(m) = regex.find_at(text, cursor) else {
            break;
        };

        if m.start() == m.end() {
            cursor = next_boundary(text, m.end());
            continue;
        }

        let start = chars.char_offset(m.start());
        let end = chars.char_offset(m.end());
        spans.push(Span {
            start,
            end,
            source: m.as_str(),
        });
        cursor = m.end();
    }

    spans
}

/// Byte index of the char boundary after `at`, or past the end
fn next_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map(|c| at + c.len_utf8())
        .unwrap_or(text.len() + 1)
}

/// Converts increasing byte offsets to char offsets in one pass
struct CharIndexer<'t> {
    text: &'t str,
    byte: usize,
    chars: usize,
}

impl<'t> CharIndexer<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    fn char_offset(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            return self.text[..byte].chars().count();
        }
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_matches_in_order() {
        let re = Regex::new(r"\d+").unwrap();
        let spans = scan(&re, "call 555 or 1234 now");

        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end, spans[0].source), (5, 8, "555"));
        assert_eq!((spans[1].start, spans[1].end, spans[1].source), (12, 16, "1234"));
    }

    #[test]
    fn test_zero_length_matches_terminate() {
        let re = Regex::new(r"x*").unwrap();
        let text = "abxxc";
        let spans = scan(&re, text);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].source, "xx");
        assert!(spans.iter().all(|s| s.end <= text.chars().count() && s.start < s.end));
    }

    #[test]
    fn test_only_empty_matches() {
        let re = Regex::new(r"^").unwrap();
        assert!(scan(&re, "hello").is_empty());
        assert!(scan(&re, "").is_empty());
    }

    #[test]
    fn test_char_offsets_with_multibyte_text() {
        let re = Regex::new(r"café").unwrap();
        let spans = scan(&re, "un café, deux café");

        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (3, 7));
        assert_eq!((spans[1].start, spans[1].end), (14, 18));
    }

    #[test]
    fn test_matches_do_not_overlap() {
        let re = Regex::new(r"aa").unwrap();
        let spans = scan(&re, "aaaaa");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].start, 2);
    }
}
