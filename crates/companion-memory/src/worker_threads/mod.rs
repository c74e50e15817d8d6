pub mod llm_worker;
pub mod post_process_worker;
pub use llm_worker::{LLMWorker, TextGenerator, UnavailableGenerator};
pub use post_process_worker::{PostProcessJob, PostProcessQueue, PostProcessWorker};
