//! API module - HTTP handlers over the memory engine

pub mod chat_api;
pub mod memory_api;
pub mod prompt_builder;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use validator::Validate;

pub use chat_api::{chat, chat_history};
pub use memory_api::{get_memory, set_user_name};
pub use prompt_builder::PromptBuilder;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_GATEWAY, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "code": self.status.as_u16(),
            })),
        )
            .into_response()
    }
}

/// Unwraps a JSON body and runs its `Validate` rules; both failures are 400s.
pub(crate) fn validated<T: Validate>(
    payload: Result<Json<T>, JsonRejection>,
    message: &str,
) -> Result<T, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(format!("{}: {}", message, e.body_text())))?;
    body.validate()
        .map_err(|e| ApiError::bad_request(format!("{}: {}", message, e)))?;
    Ok(body)
}

/// Rejects ids that are blank, oversized or carry control characters.
pub(crate) fn validate_user_id(user_id: &str) -> Result<(), ApiError> {
    if user_id.trim().is_empty() {
        return Err(ApiError::bad_request("userId cannot be empty"));
    }
    if user_id.len() > 256 {
        return Err(ApiError::bad_request("userId too long (max 256 chars)"));
    }
    if user_id.chars().any(char::is_control) {
        return Err(ApiError::bad_request("userId contains control characters"));
    }
    Ok(())
}
