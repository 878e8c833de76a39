//! Utterance normalization for exact matching

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters removed before comparing utterances
pub const STRIPPED_CHARS: &[char] = &[
    '.', ',', '/', '#', '!', '$', '%', '^', '&', '*', ';', ':', '{', '}', '=', '-', '_', '`', '~',
    '(', ')', '?', '\'', '"', '[', ']', '<', '>', '@', '+', '|', '\\',
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strip punctuation, lowercase, and collapse whitespace.
///
/// Two utterances are exact matches iff their normalized forms are equal.
pub fn normalize_utterance(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .flat_map(char::to_lowercase)
        .collect();
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}
