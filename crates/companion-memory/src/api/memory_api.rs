use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use validator::Validate;

use crate::api::{validate_user_id, validated, ApiError};
use crate::metrics;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SetNameRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

pub async fn get_memory(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    validate_user_id(&user_id)?;
    match state.engine.get_memory_snapshot(&user_id) {
        Ok(snapshot) => {
            metrics::inc_request("memory_get", "ok");
            Ok(Json(json!({
                "user": snapshot.profile,
                "memory": snapshot.memory,
            })))
        }
        Err(e) => {
            metrics::inc_request("memory_get", "error");
            error!("Failed to load memory for {}: {}", user_id, e);
            Err(ApiError::internal(format!("Failed to retrieve memory: {}", e)))
        }
    }
}

pub async fn set_user_name(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<SetNameRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    validate_user_id(&user_id)?;
    let request = validated(payload, "Name is required")?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }

    match state.engine.set_user_name(&user_id, name) {
        Ok(profile) => {
            metrics::inc_request("memory_set_name", "ok");
            info!("Name updated for {}", user_id);
            Ok(Json(json!({ "success": true, "user": profile })))
        }
        Err(e) => {
            metrics::inc_request("memory_set_name", "error");
            error!("Failed to set name for {}: {}", user_id, e);
            Err(ApiError::internal(format!("Failed to update name: {}", e)))
        }
    }
}
