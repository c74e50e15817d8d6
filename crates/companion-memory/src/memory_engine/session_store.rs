//! Session transcripts and the idle boundary that splits them

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::document_store::DocumentStore;
use crate::memory_db::schema::{Message, Role, Session, Tone};

pub const DEFAULT_IDLE_SECONDS: i64 = 3600;

pub struct SessionStore {
    store: Arc<dyn DocumentStore>,
    idle_threshold: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_idle_threshold(store, Duration::seconds(DEFAULT_IDLE_SECONDS))
    }

    pub fn with_idle_threshold(store: Arc<dyn DocumentStore>, idle_threshold: Duration) -> Self {
        Self { store, idle_threshold }
    }

    /// The user's most recently updated session, however old.
    pub fn get_active_session(&self, user_id: &str) -> anyhow::Result<Option<Session>> {
        self.store.latest_session(user_id)
    }

    pub fn append_turn(
        &self,
        user_id: &str,
        user_message: &str,
        assistant_message: &str,
        tone: Tone,
    ) -> anyhow::Result<Session> {
        self.append_turn_at(user_id, user_message, assistant_message, tone, Utc::now())
    }

    /// Appends a user/assistant pair, starting a new session when the active
    /// one has been idle for longer than the threshold. Exactly the threshold
    /// still reuses the session.
    pub fn append_turn_at(
        &self,
        user_id: &str,
        user_message: &str,
        assistant_message: &str,
        tone: Tone,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Session> {
        let mut session = match self.store.latest_session(user_id)? {
            Some(active) if now - active.updated_at > self.idle_threshold => {
                info!(
                    "Session {} for {} idle since {}, starting a new one",
                    active.id, user_id, active.updated_at
                );
                Session::new(user_id, now)
            }
            Some(active) => active,
            None => {
                debug!("First session for {}", user_id);
                Session::new(user_id, now)
            }
        };

        session.messages.push(Message {
            role: Role::User,
            content: user_message.to_string(),
            timestamp: now,
            tone: Some(tone),
        });
        session.messages.push(Message {
            role: Role::Assistant,
            content: assistant_message.to_string(),
            timestamp: now,
            tone: None,
        });
        session.touch(now);

        self.store.upsert_session(&session)?;
        Ok(session)
    }

    /// Last `limit` messages of the active session, oldest first.
    pub fn recent_context(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<Message>> {
        let Some(session) = self.store.latest_session(user_id)? else {
            return Ok(Vec::new());
        };
        let skip = session.messages.len().saturating_sub(limit);
        Ok(session.messages.into_iter().skip(skip).collect())
    }

    pub fn uncompressed_sessions(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<Session>> {
        self.store.uncompressed_sessions(user_id, limit)
    }

    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        self.store.upsert_session(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;

    fn sessions() -> (SessionStore, Arc<InMemoryDocumentStore>) {
        let docs = Arc::new(InMemoryDocumentStore::new());
        (SessionStore::new(docs.clone()), docs)
    }

    #[test]
    fn test_turns_more_than_an_hour_apart_split_sessions() {
        let (store, docs) = sessions();
        let start = Utc::now() - Duration::hours(3);

        let first = store.append_turn_at("u1", "hi", "hello", Tone::Casual, start).unwrap();
        let later = start + Duration::seconds(DEFAULT_IDLE_SECONDS + 1);
        let second = store.append_turn_at("u1", "back", "welcome back", Tone::Neutral, later).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.messages.len(), 2);
        assert_eq!(docs.list_sessions("u1").unwrap().len(), 2);
        assert_eq!(store.get_active_session("u1").unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_turns_within_an_hour_share_a_session() {
        let (store, docs) = sessions();
        let start = Utc::now() - Duration::hours(3);

        let first = store.append_turn_at("u1", "hi", "hello", Tone::Casual, start).unwrap();
        let second = store
            .append_turn_at("u1", "still here", "great", Tone::Neutral, start + Duration::minutes(59))
            .unwrap();
        let third = store
            .append_turn_at(
                "u1",
                "and again",
                "sure",
                Tone::Neutral,
                start + Duration::minutes(59) + Duration::seconds(DEFAULT_IDLE_SECONDS),
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.id, third.id);
        assert_eq!(third.messages.len(), 6);
        assert_eq!(docs.list_sessions("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_append_turn_records_roles_and_tone() {
        let (store, _) = sessions();
        let session = store.append_turn("u1", "I'm so sad", "I'm here", Tone::Sad).unwrap();

        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[0].tone, Some(Tone::Sad));
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert_eq!(session.messages[1].tone, None);
        assert_eq!(session.last_user_tone(), Some(Tone::Sad));
        assert_eq!(session.version, 1);
    }

    #[test]
    fn test_recent_context_is_chronological_tail() {
        let (store, _) = sessions();
        assert!(store.recent_context("u1", 10).unwrap().is_empty());

        for i in 0..4 {
            store
                .append_turn("u1", &format!("q{}", i), &format!("a{}", i), Tone::Neutral)
                .unwrap();
        }
        let context = store.recent_context("u1", 3).unwrap();
        let contents: Vec<&str> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a2", "q3", "a3"]);

        assert_eq!(store.recent_context("u1", 100).unwrap().len(), 8);
    }

    #[test]
    fn test_custom_idle_threshold() {
        let docs = Arc::new(InMemoryDocumentStore::new());
        let store = SessionStore::with_idle_threshold(docs, Duration::minutes(5));
        let start = Utc::now();

        let first = store.append_turn_at("u1", "a", "b", Tone::Neutral, start).unwrap();
        let second = store
            .append_turn_at("u1", "c", "d", Tone::Neutral, start + Duration::minutes(6))
            .unwrap();
        assert_ne!(first.id, second.id);
    }
}
