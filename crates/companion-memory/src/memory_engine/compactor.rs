//! Folds long, uncompacted sessions into a summary plus a short tail

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::memory_db::schema::Session;
use crate::memory_engine::memory_store::MemoryStore;
use crate::memory_engine::session_store::SessionStore;
use crate::utils::TopicExtractor;
use crate::worker_threads::llm_worker::{generate_with_deadline, TextGenerator};

/// Sessions with this many messages or fewer are left alone.
pub const COMPACTION_MIN_MESSAGES: usize = 10;
pub const COMPACTED_TAIL: usize = 5;
pub const DEFAULT_BATCH_LIMIT: usize = 20;
pub const PLACEHOLDER_SUMMARY: &str = "Conversation summary (compressed)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub examined: usize,
    pub compacted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Compactor {
    sessions: Arc<SessionStore>,
    memory: Arc<MemoryStore>,
    generator: Arc<dyn TextGenerator>,
    generation_timeout: Duration,
}

impl Compactor {
    pub fn new(
        sessions: Arc<SessionStore>,
        memory: Arc<MemoryStore>,
        generator: Arc<dyn TextGenerator>,
        generation_timeout: Duration,
    ) -> Self {
        Self { sessions, memory, generator, generation_timeout }
    }

    /// Compacts up to `batch_limit` of the user's newest uncompacted sessions.
    /// Only the selection query can fail the whole run; a failing session is
    /// counted and the rest of the batch continues.
    pub async fn compress_old_sessions(
        &self,
        user_id: &str,
        batch_limit: usize,
    ) -> anyhow::Result<CompactionReport> {
        let candidates = self.sessions.uncompressed_sessions(user_id, batch_limit)?;
        let mut report = CompactionReport::default();

        for mut session in candidates {
            report.examined += 1;
            if session.messages.len() <= COMPACTION_MIN_MESSAGES {
                report.skipped += 1;
                continue;
            }
            match self.compact_session(&mut session).await {
                Ok(()) => report.compacted += 1,
                Err(e) => {
                    warn!("Compaction of session {} for {} failed: {}", session.id, user_id, e);
                    report.failed += 1;
                }
            }
        }

        if report.compacted > 0 {
            crate::metrics::inc_compacted(report.compacted as u64);
        }
        info!(
            "Compaction for {}: {} examined, {} compacted, {} skipped, {} failed",
            user_id, report.examined, report.compacted, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn compact_session(&self, session: &mut Session) -> anyhow::Result<()> {
        let transcript = session
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let summary = self.summarize(&session.id, &transcript).await;

        // updated_at is left alone so a compacted session never becomes the
        // active one again.
        session.summary = Some(summary.clone());
        session.is_compressed = true;
        let excess = session.messages.len().saturating_sub(COMPACTED_TAIL);
        session.messages.drain(..excess);
        session.version += 1;
        self.sessions.save(session)?;

        let topics = TopicExtractor::extract_topics(&transcript);
        self.memory
            .append_summary(&session.user_id, &summary, topics, session.created_at)?;

        debug!("Compacted session {} ({} messages dropped)", session.id, excess);
        Ok(())
    }

    async fn summarize(&self, session_id: &str, transcript: &str) -> String {
        let prompt = format!(
            "Summarize this conversation in 2-3 sentences, focusing on key topics, \
             user preferences, and important information:\n\n{}",
            transcript
        );
        match generate_with_deadline(self.generator.as_ref(), &prompt, self.generation_timeout).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Empty summary for session {}, using placeholder", session_id);
                PLACEHOLDER_SUMMARY.to_string()
            }
            Err(e) => {
                warn!("Summary generation failed for session {}: {}", session_id, e);
                PLACEHOLDER_SUMMARY.to_string()
            }
        }
    }
}
