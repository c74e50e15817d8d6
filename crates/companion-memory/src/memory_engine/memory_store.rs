//! Long-term memory bookkeeping: fact dedup and scoring, contradiction
//! quarantine, summary retention and profile preferences.
//!
//! Each public operation is one read followed by one write of the affected
//! document. There is no per-user lock, so concurrent operations for the same
//! user can lose updates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::document_store::DocumentStore;
use crate::memory_db::schema::{
    Contradiction, ConversationSummary, Fact, FactCategory, Memory, Tone, UserProfile,
};
use crate::utils::TextUtils;

pub const MAX_FACTS: usize = 50;
pub const MAX_SUMMARIES: usize = 10;
pub const MAX_INTERESTS: usize = 20;
pub const NEW_FACT_CONFIDENCE: f64 = 0.5;
pub const CONFIDENCE_STEP: f64 = 0.1;

/// A user's memory document together with the paired profile.
#[derive(Debug, Clone, Serialize)]
pub struct UserMemory {
    pub profile: UserProfile,
    pub memory: Memory,
}

pub struct MemoryStore {
    store: Arc<dyn DocumentStore>,
}

impl MemoryStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Fetches both documents, creating and persisting empty ones when absent.
    pub fn get_or_create(&self, user_id: &str) -> anyhow::Result<UserMemory> {
        let now = Utc::now();
        let profile = self.load_or_create_profile(user_id, now)?;
        let memory = self.load_or_create_memory(user_id, now)?;
        Ok(UserMemory { profile, memory })
    }

    fn load_or_create_profile(&self, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<UserProfile> {
        if let Some(profile) = self.store.find_profile(user_id)? {
            return Ok(profile);
        }
        let mut profile = UserProfile::new(user_id, now);
        profile.touch(now);
        self.store.upsert_profile(&profile)?;
        info!("Created profile for user {}", user_id);
        Ok(profile)
    }

    fn load_or_create_memory(&self, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<Memory> {
        if let Some(memory) = self.store.find_memory(user_id)? {
            return Ok(memory);
        }
        let mut memory = Memory::empty(user_id, now);
        memory.touch(now);
        self.store.upsert_memory(&memory)?;
        info!("Created memory record for user {}", user_id);
        Ok(memory)
    }

    /// Folds candidate fact texts into the user's memory, in input order.
    pub fn update_memory(&self, user_id: &str, new_facts: &[String]) -> anyhow::Result<Memory> {
        let now = Utc::now();
        let mut memory = self.load_or_create_memory(user_id, now)?;
        let contradictions_before = memory.contradictions.len();

        for candidate in new_facts {
            let candidate_lower = candidate.to_lowercase();

            if let Some(existing) = memory
                .facts
                .iter_mut()
                .find(|f| f.text.to_lowercase() == candidate_lower)
            {
                existing.confidence = (existing.confidence + CONFIDENCE_STEP).min(1.0);
                existing.last_mentioned = now;
                continue;
            }

            let conflicting: Vec<String> = memory
                .facts
                .iter()
                .filter(|f| Self::is_contradiction(&f.text, candidate))
                .map(|f| f.text.clone())
                .collect();

            if !conflicting.is_empty() {
                debug!(
                    "Quarantining '{}' for {}: conflicts with {} fact(s)",
                    TextUtils::truncate_with_ellipsis(candidate, 60),
                    user_id,
                    conflicting.len()
                );
                memory.contradictions.push(Contradiction {
                    text: candidate.clone(),
                    conflicting_with: conflicting,
                    date: now,
                    resolution: None,
                });
                continue;
            }

            memory.facts.push(Fact {
                text: candidate.clone(),
                confidence: NEW_FACT_CONFIDENCE,
                last_mentioned: now,
                category: Self::categorize_fact(candidate),
            });
        }

        Self::rank_and_cap_facts(&mut memory);
        memory.touch(now);
        self.store.upsert_memory(&memory)?;

        let new_contradictions = memory.contradictions.len() - contradictions_before;
        if new_contradictions > 0 {
            crate::metrics::inc_contradictions(new_contradictions as u64);
        }
        info!(
            "Updated memory for {}: {} candidates, {} facts stored, {} new contradictions",
            user_id,
            new_facts.len(),
            memory.facts.len(),
            new_contradictions
        );
        Ok(memory)
    }

    /// An existing fact with the same text is replaced in place; otherwise the
    /// first fact mentioning "name" is overwritten, or the fact is appended.
    /// Any other copy of the same text is then dropped so texts stay unique.
    fn place_name_fact(memory: &mut Memory, name_fact: Fact) {
        let key = name_fact.text.to_lowercase();
        let slot = memory
            .facts
            .iter()
            .position(|f| f.text.to_lowercase() == key)
            .or_else(|| memory.facts.iter().position(|f| f.text.to_lowercase().contains("name")));

        let kept = match slot {
            Some(i) => {
                memory.facts[i] = name_fact;
                i
            }
            None => {
                memory.facts.push(name_fact);
                memory.facts.len() - 1
            }
        };

        let mut index = 0;
        memory.facts.retain(|f| {
            let keep = index == kept || f.text.to_lowercase() != key;
            index += 1;
            keep
        });
    }

    /// Highest confidence first, lowest evicted past the cap. The sort is
    /// stable, so equal confidences keep insertion order.
    fn rank_and_cap_facts(memory: &mut Memory) {
        memory.facts.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        memory.facts.truncate(MAX_FACTS);
    }

    /// Word-overlap heuristic, not negation detection: flags a like/dislike
    /// pair when any space-separated word of the stored fact occurs inside
    /// the candidate. Note that "dislike" contains "like", so two dislikes
    /// sharing a word are flagged as well.
    pub fn is_contradiction(existing: &str, candidate: &str) -> bool {
        let existing_lower = existing.to_lowercase();
        let candidate_lower = candidate.to_lowercase();

        let shares_word = existing_lower
            .split(' ')
            .filter(|w| !w.is_empty())
            .any(|w| candidate_lower.contains(w));

        let like_then_dislike = existing_lower.contains("like") && candidate_lower.contains("dislike");
        let dislike_then_like = existing_lower.contains("dislike") && candidate_lower.contains("like");

        (like_then_dislike || dislike_then_like) && shares_word
    }

    /// First matching keyword rule wins.
    pub fn categorize_fact(text: &str) -> FactCategory {
        const RULES: [(&[&str], FactCategory); 5] = [
            (&["name", "called"], FactCategory::Personal),
            (&["like", "love", "enjoy"], FactCategory::Preference),
            (&["dislike", "hate", "don't like"], FactCategory::Preference),
            (&["work", "job", "occupation"], FactCategory::Personal),
            (&["interest", "hobby", "favorite"], FactCategory::Interest),
        ];

        let lower = text.to_lowercase();
        RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(_, category)| *category)
            .unwrap_or(FactCategory::General)
    }

    /// Appends a summary and keeps only the most recent `MAX_SUMMARIES`.
    pub fn append_summary(
        &self,
        user_id: &str,
        summary: &str,
        key_topics: Vec<String>,
        date: DateTime<Utc>,
    ) -> anyhow::Result<Memory> {
        let now = Utc::now();
        let mut memory = self.load_or_create_memory(user_id, now)?;

        memory.conversation_summaries.push(ConversationSummary {
            summary: summary.to_string(),
            date,
            key_topics,
        });
        let overflow = memory.conversation_summaries.len().saturating_sub(MAX_SUMMARIES);
        memory.conversation_summaries.drain(..overflow);

        memory.touch(now);
        self.store.upsert_memory(&memory)?;
        Ok(memory)
    }

    /// Records the latest non-neutral tone and appends unseen topics to the
    /// interest list, evicting the oldest past `MAX_INTERESTS`.
    pub fn update_preferences(
        &self,
        user_id: &str,
        topics: &[String],
        tone: Tone,
    ) -> anyhow::Result<UserProfile> {
        let now = Utc::now();
        let mut profile = self.load_or_create_profile(user_id, now)?;
        let preferences = &mut profile.preferences;

        if tone != Tone::Neutral {
            preferences.tone = Some(tone);
        }
        for topic in topics {
            if !preferences.interests.contains(topic) {
                preferences.interests.push(topic.clone());
            }
        }
        let overflow = preferences.interests.len().saturating_sub(MAX_INTERESTS);
        preferences.interests.drain(..overflow);

        profile.touch(now);
        self.store.upsert_profile(&profile)?;
        debug!("Updated preferences for {}: {:?}", user_id, profile.preferences);
        Ok(profile)
    }

    /// Sets the profile name and overwrites (or adds) the name fact at full
    /// confidence.
    pub fn set_user_name(&self, user_id: &str, name: &str) -> anyhow::Result<UserProfile> {
        let now = Utc::now();

        let mut profile = self.load_or_create_profile(user_id, now)?;
        profile.name = Some(name.to_string());
        profile.touch(now);
        self.store.upsert_profile(&profile)?;

        let mut memory = self.load_or_create_memory(user_id, now)?;
        let name_fact = Fact {
            text: format!("User's name is {}", name),
            confidence: 1.0,
            last_mentioned: now,
            category: FactCategory::Personal,
        };
        Self::place_name_fact(&mut memory, name_fact);
        Self::rank_and_cap_facts(&mut memory);
        memory.touch(now);
        self.store.upsert_memory(&memory)?;

        info!("Set name for user {}", user_id);
        Ok(profile)
    }
}
