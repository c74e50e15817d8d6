//! HTTP server startup and routing
//!
//! Builds the document store, generator and engine once, starts the
//! post-processing worker, and serves the JSON API.

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::api::ApiError;
use crate::config::Config;
use crate::document_store::DocumentStore;
use crate::memory_db::MemoryDatabase;
use crate::memory_engine::MemoryEngine;
use crate::shared_state::AppState;
use crate::worker_threads::llm_worker::generator_from_config;
use crate::worker_threads::{PostProcessQueue, PostProcessWorker};

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let store = open_store(&cfg.database_path)?;
    let engine = Arc::new(MemoryEngine::new(store, generator_from_config(&cfg), cfg.engine_config()));
    let (post_process, worker_handle) = PostProcessWorker::spawn(engine.clone());

    let addr = cfg.api_addr()?;
    let request_timeout = Duration::from_secs(cfg.request_timeout_seconds);
    let state = AppState::new(engine, post_process.clone(), cfg);
    let app = build_router(state, request_timeout);

    info!("Starting HTTP server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve_until(listener, app, post_process, worker_handle, shutdown_signal()).await
}

/// Serves until `shutdown` resolves, then stops the post-processing worker and
/// waits for the jobs it already started.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    post_process: PostProcessQueue,
    worker_handle: JoinHandle<()>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("HTTP server stopped, draining post-process worker");
    post_process.shutdown();
    if let Err(e) = worker_handle.await {
        warn!("Post-process worker ended abnormally: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// SQLite at `path`, or an in-memory database when the file cannot be opened.
fn open_store(path: &str) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let db_path = std::path::Path::new(path);
    match MemoryDatabase::new(db_path) {
        Ok(db) => {
            info!("Memory database initialized at: {}", db_path.display());
            match db.get_stats() {
                Ok(stats) => info!(
                    "Loaded {} profiles, {} memories, {} sessions ({} compressed)",
                    stats.total_profiles, stats.total_memories, stats.total_sessions, stats.compressed_sessions
                ),
                Err(e) => warn!("Failed to read database stats: {}", e),
            }
            Ok(Arc::new(db))
        }
        Err(e) => {
            warn!("Failed to initialize memory database: {}. Falling back to in-memory.", e);
            Ok(Arc::new(MemoryDatabase::new_in_memory()?))
        }
    }
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(crate::api::chat))
        .route("/api/chat/:user_id", get(crate::api::chat_history))
        .route("/api/memory/:user_id", get(crate::api::get_memory))
        .route("/api/memory/:user_id/name", put(crate::api::set_user_name))
        .route("/api/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Companion memory service is running",
    }))
}

async fn metrics_handler() -> Result<impl IntoResponse, ApiError> {
    let buffer = crate::metrics::encode_metrics()
        .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {}", e)))?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;
    use crate::memory_db::schema::Tone;
    use crate::memory_engine::EngineConfig;
    use crate::worker_threads::llm_worker::TextGenerator;
    use crate::worker_threads::PostProcessJob;
    use async_trait::async_trait;

    struct SlowFactGenerator;

    #[async_trait]
    impl TextGenerator for SlowFactGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(r#"["User plays chess on Sundays"]"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_background_jobs_before_returning() {
        let config = EngineConfig { compaction_probability: 0.0, ..EngineConfig::default() };
        let engine = Arc::new(MemoryEngine::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(SlowFactGenerator),
            config,
        ));
        let (queue, handle) = PostProcessWorker::spawn(engine.clone());
        assert!(queue.enqueue(PostProcessJob {
            user_id: "u1".to_string(),
            user_message: "I play chess on Sundays".to_string(),
            assistant_message: "Nice".to_string(),
            tone: Tone::Neutral,
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(listener, Router::new(), queue, handle, async move {
            let _ = stop_rx.await;
        }));

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();

        let memory = engine.get_memory_snapshot("u1").unwrap().memory;
        assert_eq!(memory.facts.len(), 1);
        assert_eq!(memory.facts[0].text, "User plays chess on Sundays");
    }
}
