//! Keyed document store boundary and an in-process implementation
//!
//! Every method is a single atomic read or write of one document. Nothing
//! here serializes a read-modify-write across calls: two concurrent turns for
//! the same user can both read the same document and the later write wins.

use dashmap::DashMap;
use std::sync::Arc;

use crate::memory_db::schema::{Memory, Session, UserProfile};

pub trait DocumentStore: Send + Sync {
    fn find_profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>>;
    fn upsert_profile(&self, profile: &UserProfile) -> anyhow::Result<()>;

    fn find_memory(&self, user_id: &str) -> anyhow::Result<Option<Memory>>;
    fn upsert_memory(&self, memory: &Memory) -> anyhow::Result<()>;

    /// The user's session with the most recent `updated_at`.
    fn latest_session(&self, user_id: &str) -> anyhow::Result<Option<Session>>;
    /// Sessions not yet compacted, newest `created_at` first, at most `limit`.
    fn uncompressed_sessions(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<Session>>;
    /// All sessions for the user, compacted ones included, newest `updated_at`
    /// first. Inspection API for tests and embedders; no engine path or route
    /// reads it.
    fn list_sessions(&self, user_id: &str) -> anyhow::Result<Vec<Session>>;
    fn upsert_session(&self, session: &Session) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    profiles: Arc<DashMap<String, UserProfile>>,
    memories: Arc<DashMap<String, Memory>>,
    sessions: Arc<DashMap<String, Vec<Session>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn find_profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    fn upsert_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    fn find_memory(&self, user_id: &str) -> anyhow::Result<Option<Memory>> {
        Ok(self.memories.get(user_id).map(|m| m.clone()))
    }

    fn upsert_memory(&self, memory: &Memory) -> anyhow::Result<()> {
        self.memories.insert(memory.user_id.clone(), memory.clone());
        Ok(())
    }

    fn latest_session(&self, user_id: &str) -> anyhow::Result<Option<Session>> {
        let Some(sessions) = self.sessions.get(user_id) else {
            return Ok(None);
        };
        // Later insertion wins a tie on updated_at.
        Ok(sessions
            .iter()
            .enumerate()
            .max_by_key(|(idx, s)| (s.updated_at, *idx))
            .map(|(_, s)| s.clone()))
    }

    fn uncompressed_sessions(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<Session>> {
        let Some(sessions) = self.sessions.get(user_id) else {
            return Ok(Vec::new());
        };
        let mut pending: Vec<(usize, &Session)> = sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_compressed)
            .collect();
        pending.sort_by(|a, b| (b.1.created_at, b.0).cmp(&(a.1.created_at, a.0)));
        Ok(pending.into_iter().take(limit).map(|(_, s)| s.clone()).collect())
    }

    fn list_sessions(&self, user_id: &str) -> anyhow::Result<Vec<Session>> {
        let Some(sessions) = self.sessions.get(user_id) else {
            return Ok(Vec::new());
        };
        let mut all: Vec<(usize, Session)> = sessions.iter().cloned().enumerate().collect();
        all.sort_by(|a, b| (b.1.updated_at, b.0).cmp(&(a.1.updated_at, a.0)));
        Ok(all.into_iter().map(|(_, s)| s).collect())
    }

    fn upsert_session(&self, session: &Session) -> anyhow::Result<()> {
        let mut entry = self.sessions.entry(session.user_id.clone()).or_default();
        match entry.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => entry.push(session.clone()),
        }
        Ok(())
    }
}
