//! Record definitions for the three document collections and their SQLite tables
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

/// Coarse emotional register of a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Sad,
    Excited,
    Sarcastic,
    Angry,
    Playful,
    Formal,
    Casual,
    Neutral,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Sad => "sad",
            Tone::Excited => "excited",
            Tone::Sarcastic => "sarcastic",
            Tone::Angry => "angry",
            Tone::Playful => "playful",
            Tone::Formal => "formal",
            Tone::Casual => "casual",
            Tone::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Personal,
    Preference,
    Interest,
    General,
}

/// A short statement about the user with a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub text: String,
    pub confidence: f64,
    pub last_mentioned: DateTime<Utc>,
    pub category: FactCategory,
}

/// A candidate fact held back because it lexically conflicts with stored facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contradiction {
    pub text: String,
    pub conflicting_with: Vec<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub summary: String,
    pub date: DateTime<Utc>,
    pub key_topics: Vec<String>,
}

/// Long-term memory document, one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub user_id: String,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub conversation_summaries: Vec<ConversationSummary>,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    pub fn empty(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            facts: Vec::new(),
            conversation_summaries: Vec::new(),
            contradictions: Vec::new(),
            version: 0,
            updated_at: now,
        }
    }

    /// Marks the record as written at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
}

/// A time-windowed transcript for one user (a "chat").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub is_compressed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Session {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            messages: Vec::new(),
            summary: None,
            is_compressed: false,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// Tone recorded on the most recent user message, if any.
    pub fn last_user_tone(&self) -> Option<Tone> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.tone)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub tone: Option<Tone>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub personality_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl UserProfile {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: None,
            preferences: Preferences::default(),
            personality_notes: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub total_profiles: i64,
    pub total_memories: i64,
    pub total_sessions: i64,
    pub compressed_sessions: i64,
}

/// Documents are stored as JSON; the indexed columns duplicate the fields the
/// session queries order and filter on.
pub const SCHEMA_SQL: &str = "
-- User profiles
CREATE TABLE IF NOT EXISTS user_profiles (
    user_id TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at TIMESTAMP NOT NULL
);
-- Long-term memory
CREATE TABLE IF NOT EXISTS memories (
    user_id TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at TIMESTAMP NOT NULL
);
-- Sessions, many per user
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    is_compressed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    version INTEGER NOT NULL,
    document TEXT NOT NULL
);
-- Indexes for the active-session and compaction queries
CREATE INDEX IF NOT EXISTS idx_sessions_user_updated ON sessions (user_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_sessions_user_created ON sessions (user_id, created_at);
";
