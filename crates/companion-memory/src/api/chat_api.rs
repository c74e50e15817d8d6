use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};
use validator::Validate;

use crate::api::{validate_user_id, validated, ApiError, PromptBuilder};
use crate::memory_db::schema::Tone;
use crate::metrics;
use crate::shared_state::AppState;
use crate::utils::TextUtils;
use crate::worker_threads::llm_worker::generate_with_deadline;
use crate::worker_threads::PostProcessJob;

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 16384))]
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub tone: Tone,
    pub tone_shift: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
}

/// One conversational turn: classify, generate the reply, persist it, then
/// hand bookkeeping to the background worker.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = validated(payload, "userId and message are required")?;
    validate_user_id(&request.user_id)?;
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("userId and message are required"));
    }

    let engine = &state.engine;
    let turn = engine.handle_turn(&request.user_id, &request.message).map_err(|e| {
        metrics::inc_request("chat", "error");
        error!("Failed to load memory for {}: {}", request.user_id, e);
        ApiError::internal(format!("Failed to process chat message: {}", e))
    })?;

    let prompt = PromptBuilder::new(&state.config.bot_name).build(&turn, &request.message);
    let deadline = Duration::from_secs(state.config.generation_timeout_seconds);
    let reply = match generate_with_deadline(engine.generator().as_ref(), &prompt, deadline).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            metrics::inc_request("chat", "generation_error");
            warn!("Reply generation failed for {}: {}", request.user_id, e);
            return Err(ApiError::bad_gateway(format!("Failed to generate response: {}", e)));
        }
    };

    engine
        .record_turn(&request.user_id, &request.message, &reply, turn.tone)
        .map_err(|e| {
            metrics::inc_request("chat", "error");
            error!("Failed to save turn for {}: {}", request.user_id, e);
            ApiError::internal(format!("Failed to save conversation: {}", e))
        })?;

    state.post_process.enqueue(PostProcessJob {
        user_id: request.user_id.clone(),
        user_message: request.message.clone(),
        assistant_message: reply.clone(),
        tone: turn.tone,
    });

    metrics::inc_request("chat", "ok");
    debug!(
        "Replied to {} with tone {}: {}",
        request.user_id,
        turn.tone,
        TextUtils::truncate_with_ellipsis(&reply, 80)
    );
    Ok(Json(ChatResponse {
        response: reply,
        tone: turn.tone,
        tone_shift: turn.tone_shift,
        timestamp: Utc::now(),
    }))
}

/// Tail of the active session. A missing, zero or unparsable limit means 50.
pub async fn chat_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    validate_user_id(&user_id)?;
    let limit = query
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    match state.engine.session_store().recent_context(&user_id, limit) {
        Ok(messages) => {
            metrics::inc_request("chat_history", "ok");
            Ok(Json(json!({ "messages": messages })))
        }
        Err(e) => {
            metrics::inc_request("chat_history", "error");
            error!("Failed to load history for {}: {}", user_id, e);
            Err(ApiError::internal(format!("Failed to retrieve chat history: {}", e)))
        }
    }
}
