//! MemoryEngine - the facade the route layer talks to
//!
//! One engine value is built at startup and shared by handle. The synchronous
//! path (`handle_turn`, `record_turn`) only touches the stores; everything that
//! calls the generator for bookkeeping lives in `post_process`, which runs off
//! the response path.

use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::document_store::DocumentStore;
use crate::memory_db::schema::{Message, Role, Session, Tone, UserProfile};
use crate::memory_engine::compactor::{CompactionReport, Compactor, DEFAULT_BATCH_LIMIT};
use crate::memory_engine::fact_extractor::FactExtractor;
use crate::memory_engine::memory_store::{MemoryStore, UserMemory};
use crate::memory_engine::session_store::{SessionStore, DEFAULT_IDLE_SECONDS};
use crate::memory_engine::tone_classifier::ToneClassifier;
use crate::utils::TopicExtractor;
use crate::worker_threads::llm_worker::{generate_with_deadline, TextGenerator};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub session_idle: chrono::Duration,
    pub context_window: usize,
    /// Chance in [0, 1] that a post-processed turn also triggers compaction.
    pub compaction_probability: f64,
    pub compaction_batch_limit: usize,
    pub generation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_idle: chrono::Duration::seconds(DEFAULT_IDLE_SECONDS),
            context_window: 10,
            compaction_probability: 0.1,
            compaction_batch_limit: DEFAULT_BATCH_LIMIT,
            generation_timeout: Duration::from_secs(30),
        }
    }
}

/// What the route layer needs to assemble a reply prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    pub tone: Tone,
    pub tone_shift: bool,
    pub snapshot: UserMemory,
    pub context: Vec<Message>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostProcessOutcome {
    pub facts_extracted: usize,
    pub topics: Vec<String>,
    pub compaction: Option<CompactionReport>,
}

pub struct MemoryEngine {
    config: EngineConfig,
    memory: Arc<MemoryStore>,
    sessions: Arc<SessionStore>,
    compactor: Compactor,
    generator: Arc<dyn TextGenerator>,
}

impl MemoryEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        config: EngineConfig,
    ) -> Self {
        let memory = Arc::new(MemoryStore::new(store.clone()));
        let sessions = Arc::new(SessionStore::with_idle_threshold(store, config.session_idle));
        let compactor = Compactor::new(
            sessions.clone(),
            memory.clone(),
            generator.clone(),
            config.generation_timeout,
        );
        Self { config, memory, sessions, compactor, generator }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory_store(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        self.generator.clone()
    }

    /// Classifies the message and gathers the memory snapshot and context
    /// window. Tone shift compares against the last user message of the
    /// active session.
    pub fn handle_turn(&self, user_id: &str, message: &str) -> anyhow::Result<TurnContext> {
        let tone = ToneClassifier::detect_tone(message);
        let snapshot = self.memory.get_or_create(user_id)?;

        let active = self.sessions.get_active_session(user_id)?;
        let previous_tone = active.as_ref().and_then(Session::last_user_tone);
        let tone_shift = ToneClassifier::detect_tone_shift(tone, previous_tone);

        let context = match active {
            Some(session) => {
                let skip = session.messages.len().saturating_sub(self.config.context_window);
                session.messages.into_iter().skip(skip).collect()
            }
            None => Vec::new(),
        };

        debug!("Turn for {}: tone {} (shift: {}), {} context messages", user_id, tone, tone_shift, context.len());
        Ok(TurnContext { tone, tone_shift, snapshot, context })
    }

    pub fn record_turn(
        &self,
        user_id: &str,
        user_message: &str,
        assistant_message: &str,
        tone: Tone,
    ) -> anyhow::Result<Session> {
        self.sessions.append_turn(user_id, user_message, assistant_message, tone)
    }

    pub fn get_memory_snapshot(&self, user_id: &str) -> anyhow::Result<UserMemory> {
        self.memory.get_or_create(user_id)
    }

    pub fn set_user_name(&self, user_id: &str, name: &str) -> anyhow::Result<UserProfile> {
        self.memory.set_user_name(user_id, name)
    }

    /// Fact candidates from the user side of `messages`. Generator failures
    /// and timeouts yield an empty list.
    pub async fn extract_facts(&self, messages: &[Message]) -> Vec<String> {
        let transcript = FactExtractor::user_transcript(messages);
        if transcript.trim().is_empty() {
            return Vec::new();
        }

        let prompt = FactExtractor::build_prompt(&transcript);
        match generate_with_deadline(self.generator.as_ref(), &prompt, self.config.generation_timeout).await {
            Ok(output) => FactExtractor::parse_facts(&output),
            Err(e) => {
                warn!("Fact extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Background bookkeeping for one completed turn: facts, preferences and,
    /// occasionally, compaction. Store failures propagate to the caller, which
    /// is the background worker, never the reply path.
    pub async fn post_process(
        &self,
        user_id: &str,
        user_message: &str,
        assistant_message: &str,
        tone: Tone,
    ) -> anyhow::Result<PostProcessOutcome> {
        let now = chrono::Utc::now();
        let turn = [
            Message { role: Role::User, content: user_message.to_string(), timestamp: now, tone: Some(tone) },
            Message { role: Role::Assistant, content: assistant_message.to_string(), timestamp: now, tone: None },
        ];

        let facts = self.extract_facts(&turn).await;
        if !facts.is_empty() {
            self.memory.update_memory(user_id, &facts)?;
        }

        let topics = TopicExtractor::extract_topics(&format!("{} {}", user_message, assistant_message));
        if !topics.is_empty() {
            self.memory.update_preferences(user_id, &topics, tone)?;
        }

        let compaction = if self.should_compact() {
            Some(
                self.compactor
                    .compress_old_sessions(user_id, self.config.compaction_batch_limit)
                    .await?,
            )
        } else {
            None
        };

        info!(
            "Post-processed turn for {}: {} facts, topics {:?}, compaction {}",
            user_id,
            facts.len(),
            topics,
            if compaction.is_some() { "ran" } else { "skipped" }
        );
        Ok(PostProcessOutcome { facts_extracted: facts.len(), topics, compaction })
    }

    pub async fn compress_old_sessions(&self, user_id: &str) -> anyhow::Result<CompactionReport> {
        self.compactor
            .compress_old_sessions(user_id, self.config.compaction_batch_limit)
            .await
    }

    fn should_compact(&self) -> bool {
        let p = self.config.compaction_probability.clamp(0.0, 1.0);
        rand::thread_rng().gen_bool(p)
    }
}
