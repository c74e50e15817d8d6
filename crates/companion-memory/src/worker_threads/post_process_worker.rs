//! Background post-processing worker
//!
//! The route layer enqueues one job per completed turn and returns
//! immediately. The worker loop spawns a task per job, so a slow or failing
//! user never holds up another, and outcomes only reach logs and metrics.
//! Jobs already started are awaited before the worker exits.
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::memory_db::schema::Tone;
use crate::memory_engine::MemoryEngine;

#[derive(Debug, Clone)]
pub struct PostProcessJob {
    pub user_id: String,
    pub user_message: String,
    pub assistant_message: String,
    pub tone: Tone,
}

pub enum PostProcessCommand {
    Process(PostProcessJob),
    Shutdown,
}

/// Cloneable handle used to submit work.
#[derive(Clone)]
pub struct PostProcessQueue {
    sender: mpsc::UnboundedSender<PostProcessCommand>,
}

impl PostProcessQueue {
    /// Returns false when the worker has stopped; the job is dropped.
    pub fn enqueue(&self, job: PostProcessJob) -> bool {
        let user_id = job.user_id.clone();
        match self.sender.send(PostProcessCommand::Process(job)) {
            Ok(()) => true,
            Err(_) => {
                warn!("Post-process worker stopped, dropping job for {}", user_id);
                crate::metrics::inc_background_task("post_process", "dropped");
                false
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(PostProcessCommand::Shutdown);
    }
}

pub struct PostProcessWorker {
    engine: Arc<MemoryEngine>,
    receiver: mpsc::UnboundedReceiver<PostProcessCommand>,
}

impl PostProcessWorker {
    /// Starts the worker loop on the current tokio runtime.
    pub fn spawn(engine: Arc<MemoryEngine>) -> (PostProcessQueue, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = Self { engine, receiver };
        let handle = tokio::spawn(worker.run());
        info!("Post-process worker started");
        (PostProcessQueue { sender }, handle)
    }

    /// Stops on `Shutdown` or when every queue handle is gone, then waits for
    /// jobs already started.
    async fn run(self) {
        let Self { engine, mut receiver } = self;
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(PostProcessCommand::Process(job)) => {
                        in_flight.spawn(Self::process(engine.clone(), job));
                    }
                    Some(PostProcessCommand::Shutdown) | None => {
                        info!("Post-process worker shutting down");
                        break;
                    }
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight post-process jobs", in_flight.len());
        }
        while in_flight.join_next().await.is_some() {}
        debug!("Post-process worker loop exited");
    }

    async fn process(engine: Arc<MemoryEngine>, job: PostProcessJob) {
        let result = engine
            .post_process(&job.user_id, &job.user_message, &job.assistant_message, job.tone)
            .await;
        match result {
            Ok(outcome) => {
                crate::metrics::inc_background_task("post_process", "ok");
                if let Some(report) = outcome.compaction {
                    let status = if report.failed > 0 { "partial" } else { "ok" };
                    crate::metrics::inc_background_task("compaction", status);
                }
            }
            Err(e) => {
                warn!("Post-processing failed for user {}: {}", job.user_id, e);
                crate::metrics::inc_background_task("post_process", "error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;
    use crate::memory_engine::EngineConfig;
    use crate::worker_threads::llm_worker::TextGenerator;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FactGenerator;

    #[async_trait]
    impl TextGenerator for FactGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            if prompt.contains("explode") {
                return Err(anyhow::anyhow!("backend exploded"));
            }
            Ok(r#"["User enjoys gardening"]"#.to_string())
        }
    }

    struct SlowFactGenerator;

    #[async_trait]
    impl TextGenerator for SlowFactGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(r#"["User enjoys gardening"]"#.to_string())
        }
    }

    fn engine() -> Arc<MemoryEngine> {
        let config = EngineConfig { compaction_probability: 0.0, ..EngineConfig::default() };
        Arc::new(MemoryEngine::new(Arc::new(InMemoryDocumentStore::new()), Arc::new(FactGenerator), config))
    }

    fn job(user_id: &str, message: &str) -> PostProcessJob {
        PostProcessJob {
            user_id: user_id.to_string(),
            user_message: message.to_string(),
            assistant_message: "ok".to_string(),
            tone: Tone::Neutral,
        }
    }

    async fn wait_for_facts(engine: &MemoryEngine, user_id: &str) -> usize {
        for _ in 0..100 {
            let facts = engine.get_memory_snapshot(user_id).unwrap().memory.facts.len();
            if facts > 0 {
                return facts;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        0
    }

    #[tokio::test]
    async fn test_enqueued_job_updates_memory() {
        let engine = engine();
        let (queue, _handle) = PostProcessWorker::spawn(engine.clone());
        engine.get_memory_snapshot("u1").unwrap();

        assert!(queue.enqueue(job("u1", "I spent the weekend gardening")));
        assert_eq!(wait_for_facts(&engine, "u1").await, 1);
    }

    #[tokio::test]
    async fn test_failed_generation_does_not_affect_other_users() {
        let engine = engine();
        let (queue, _handle) = PostProcessWorker::spawn(engine.clone());
        // create both records up front so polling never races the worker's write
        engine.get_memory_snapshot("u1").unwrap();
        engine.get_memory_snapshot("u2").unwrap();

        assert!(queue.enqueue(job("u1", "please explode")));
        assert!(queue.enqueue(job("u2", "I spent the weekend gardening")));

        assert_eq!(wait_for_facts(&engine, "u2").await, 1);
        assert!(engine.get_memory_snapshot("u1").unwrap().memory.facts.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let (queue, handle) = PostProcessWorker::spawn(engine());
        queue.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(!queue.enqueue(job("u1", "too late")));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_jobs() {
        let config = EngineConfig { compaction_probability: 0.0, ..EngineConfig::default() };
        let engine = Arc::new(MemoryEngine::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(SlowFactGenerator),
            config,
        ));
        let (queue, handle) = PostProcessWorker::spawn(engine.clone());

        assert!(queue.enqueue(job("u1", "I spent the weekend gardening")));
        queue.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        let memory = engine.get_memory_snapshot("u1").unwrap().memory;
        assert_eq!(memory.facts.len(), 1);
    }
}
