//! Reply prompt assembly from a turn context
//!
//! Wording is free-form; what matters is which pieces of memory reach the
//! generator and in what order.

use crate::memory_db::schema::{Message, Role, Tone};
use crate::memory_engine::{TurnContext, UserMemory};

const MAX_PROMPT_FACTS: usize = 10;
const MIN_PROMPT_CONFIDENCE: f64 = 0.3;
const PROMPT_SUMMARIES: usize = 3;

pub struct PromptBuilder<'a> {
    bot_name: &'a str,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(bot_name: &'a str) -> Self {
        Self { bot_name }
    }

    pub fn tone_guidance(tone: Tone) -> &'static str {
        match tone {
            Tone::Sad => "Respond with empathy and warmth. Acknowledge their feelings and offer gentle support.",
            Tone::Excited => "Match their energy. Be enthusiastic and positive.",
            Tone::Sarcastic => "Respond playfully with light humor. Match their wit but keep it friendly.",
            Tone::Angry => "Stay calm and understanding. Acknowledge the frustration without taking it personally.",
            Tone::Playful => "Be fun and lighthearted. Friendly banter is welcome.",
            Tone::Formal => "Use structured, polite language.",
            Tone::Casual => "Be relaxed and conversational.",
            Tone::Neutral => "Keep a balanced, friendly tone.",
        }
    }

    /// Interests, likes, dislikes and the confident facts, or `None` when the
    /// user is still a blank slate.
    pub fn memory_context(snapshot: &UserMemory) -> Option<String> {
        let preferences = &snapshot.profile.preferences;
        let mut parts = Vec::new();

        if !preferences.interests.is_empty() {
            parts.push(format!("User is interested in: {}", preferences.interests.join(", ")));
        }
        if !preferences.likes.is_empty() {
            parts.push(format!("User likes: {}", preferences.likes.join(", ")));
        }
        if !preferences.dislikes.is_empty() {
            parts.push(format!("User dislikes: {}", preferences.dislikes.join(", ")));
        }

        let facts: Vec<&str> = snapshot
            .memory
            .facts
            .iter()
            .filter(|f| f.confidence > MIN_PROMPT_CONFIDENCE)
            .take(MAX_PROMPT_FACTS)
            .map(|f| f.text.as_str())
            .collect();
        if !facts.is_empty() {
            parts.push(format!("Important facts about the user: {}", facts.join("; ")));
        }

        let summaries = &snapshot.memory.conversation_summaries;
        let recent = &summaries[summaries.len().saturating_sub(PROMPT_SUMMARIES)..];
        if !recent.is_empty() {
            let joined: Vec<&str> = recent.iter().map(|s| s.summary.as_str()).collect();
            parts.push(format!("Earlier conversations: {}", joined.join(" ")));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    pub fn history(&self, messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| match m.role {
                Role::User => format!("User: {}", m.content),
                Role::Assistant => format!("{}: {}", self.bot_name, m.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn build(&self, turn: &TurnContext, user_message: &str) -> String {
        let name = self.bot_name;
        let memory = Self::memory_context(&turn.snapshot)
            .map(|m| format!("- {}", m))
            .unwrap_or_else(|| "- This is a new conversation.".to_string());
        let user_name = turn
            .snapshot
            .profile
            .name
            .as_ref()
            .map(|n| format!("\n- The user's name is {}. Use it naturally, not too often.", n))
            .unwrap_or_default();
        let shift = if turn.tone_shift {
            "\n- The user's mood has changed since their last message."
        } else {
            ""
        };

        format!(
            "You are {name}, a friendly, empathetic and curious conversational companion.\n\
             Stay in character as {name}. Do not describe yourself as an AI or a language model.\n\
             Never invent memories; if unsure, ask the user to remind you.\n\
             If the user contradicts something you remember, ask them to clarify.\n\n\
             MEMORY & CONTEXT:\n{memory}{user_name}\n\n\
             TONE:\n- Detected user tone: {tone}{shift}\n- {guidance}\n\n\
             Conversation:\n{history}\n\nUser: {message}\n{name}:",
            name = name,
            memory = memory,
            user_name = user_name,
            tone = turn.tone,
            shift = shift,
            guidance = Self::tone_guidance(turn.tone),
            history = self.history(&turn.context),
            message = user_message,
        )
    }
}
