pub mod config;
pub mod document_store;
pub mod memory_db;
pub mod memory_engine;
pub mod metrics;
pub mod telemetry;
pub mod utils;
pub mod worker_threads;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod server;
#[cfg(feature = "cli")]
pub mod shared_state;

// Public API exports
pub use config::Config;
pub use document_store::{DocumentStore, InMemoryDocumentStore};
pub use memory_db::MemoryDatabase;
pub use memory_db::schema::{
    Contradiction, ConversationSummary, Fact, FactCategory, Memory, Message, Preferences, Role,
    Session, Tone, UserProfile,
};
pub use memory_engine::{
    CompactionReport, EngineConfig, MemoryEngine, PostProcessOutcome, ToneClassifier, TurnContext,
    UserMemory,
};
pub use utils::TopicExtractor;
pub use worker_threads::{LLMWorker, TextGenerator, UnavailableGenerator};

#[cfg(feature = "cli")]
pub use server::{build_router, run_server};
#[cfg(feature = "cli")]
pub use shared_state::AppState;
