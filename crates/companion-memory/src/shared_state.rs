//! Handler state: one engine per process, shared by handle

use std::sync::Arc;

use crate::config::Config;
use crate::memory_engine::MemoryEngine;
use crate::worker_threads::PostProcessQueue;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MemoryEngine>,
    pub post_process: PostProcessQueue,
    /// Read-only after startup.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: Arc<MemoryEngine>, post_process: PostProcessQueue, config: Config) -> Self {
        Self { engine, post_process, config: Arc::new(config) }
    }
}
