//! Small text helpers shared by the classifiers and the fact parser

use std::borrow::Cow;
use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
    static ref BULLET_REGEX: Regex = Regex::new(r"^[-•]\s*").unwrap();
}

pub struct TextUtils;

impl TextUtils {
    /// Words as separated by single spaces. An empty string counts as one word
    /// and runs of spaces produce empty words; the tone length rules depend on
    /// exactly this counting.
    pub fn space_word_count(text: &str) -> usize {
        text.split(' ').count()
    }

    /// Content of a `-` or `•` bullet line with the marker removed, or `None`
    /// when the trimmed line is not a bullet.
    pub fn strip_bullet(line: &str) -> Option<&str> {
        let trimmed = line.trim();
        if !(trimmed.starts_with('-') || trimmed.starts_with('•')) {
            return None;
        }
        let rest = match BULLET_REGEX.find(trimmed) {
            Some(m) => &trimmed[m.end()..],
            None => trimmed,
        };
        Some(rest.trim())
    }

    /// Truncate to at most `max_chars` characters, ending in an ellipsis when cut.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> Cow<'_, str> {
        if text.chars().count() <= max_chars {
            Cow::Borrowed(text)
        } else if max_chars <= 3 {
            Cow::Borrowed("...")
        } else {
            let mut result: String = text.chars().take(max_chars - 3).collect();
            result.push_str("...");
            Cow::Owned(result)
        }
    }
}
