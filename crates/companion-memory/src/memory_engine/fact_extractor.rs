//! Prompt construction and output parsing for fact extraction

use lazy_static::lazy_static;
use regex::Regex;

use crate::memory_db::schema::{Message, Role};
use crate::utils::TextUtils;

lazy_static! {
    static ref JSON_ARRAY_REGEX: Regex = Regex::new(r"(?s)\[.*\]").unwrap();
}

/// Extracted strings shorter than this are dropped.
pub const MIN_FACT_CHARS: usize = 6;

pub struct FactExtractor;

impl FactExtractor {
    /// Joins the user side of the exchange; assistant lines are not evidence
    /// about the user.
    pub fn user_transcript(messages: &[Message]) -> String {
        messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn build_prompt(transcript: &str) -> String {
        format!(
            "Extract factual information about the user from this conversation. Focus on:\n\
             - Personal facts (name, age, location, occupation, hobbies)\n\
             - Preferences (likes, dislikes, interests)\n\
             - Important events or situations mentioned\n\
             - Personality traits or characteristics\n\n\
             Conversation:\n{}\n\n\
             Return ONLY a JSON array of facts, each as a string. Example:\n\
             [\"User's name is John\", \"User likes anime\", \"User works as a software engineer\"]\n\n\
             Do NOT include facts that are uncertain or speculative. Only extract clear, stated facts.",
            transcript
        )
    }

    /// Reads a JSON array of strings out of free-form model output, falling
    /// back to bullet lines when no parseable array is present.
    pub fn parse_facts(output: &str) -> Vec<String> {
        let candidates = Self::parse_json_array(output)
            .unwrap_or_else(|| Self::parse_bullets(output));

        candidates
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| f.chars().count() >= MIN_FACT_CHARS)
            .collect()
    }

    fn parse_json_array(output: &str) -> Option<Vec<String>> {
        let span = JSON_ARRAY_REGEX.find(output)?;
        let values: Vec<serde_json::Value> = serde_json::from_str(span.as_str()).ok()?;
        Some(
            values
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }

    fn parse_bullets(output: &str) -> Vec<String> {
        output
            .lines()
            .filter_map(TextUtils::strip_bullet)
            .map(str::to_string)
            .collect()
    }
}
