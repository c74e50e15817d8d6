//! Memory and tone bookkeeping engine
//!
//! Leaves first: tone classification and fact parsing are pure; the memory and
//! session stores sit on a `DocumentStore`; the compactor ties both stores to
//! the generator; the orchestrator is the facade used by the route layer.

pub mod compactor;
pub mod fact_extractor;
pub mod memory_store;
pub mod orchestrator;
pub mod session_store;
pub mod tone_classifier;

pub use compactor::{CompactionReport, Compactor};
pub use fact_extractor::FactExtractor;
pub use memory_store::{MemoryStore, UserMemory};
pub use orchestrator::{EngineConfig, MemoryEngine, PostProcessOutcome, TurnContext};
pub use session_store::SessionStore;
pub use tone_classifier::{ToneClassifier, ToneScores};
