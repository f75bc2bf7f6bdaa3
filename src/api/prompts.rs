use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::{ApiError, ApiResponse, AppState, PromptDto};
use crate::models::Role;

/// GET /prompts/active
pub async fn active(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<PromptDto>>, ApiError> {
    let prompt = state
        .store()
        .get_active_prompt()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load active prompt: {e}")))?
        .ok_or_else(|| ApiError::NotFound("No active prompt found".to_string()))?;

    Ok(Json(ApiResponse::success(PromptDto::from(prompt))))
}

/// GET /prompts
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<PromptDto>>>, ApiError> {
    auth.authorize(&[Role::Supervisor, Role::Admin])?;

    let prompts = state
        .store()
        .list_prompts()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list prompts: {e}")))?;

    Ok(Json(ApiResponse::success(
        prompts.into_iter().map(PromptDto::from).collect(),
    )))
}

#[derive(Deserialize)]
pub struct CreatePromptRequest {
    pub name: String,
    pub prompt_text: serde_json::Value,
}

/// POST /prompts
/// A new prompt becomes the active one; any previous active prompt is retired
/// in the same transaction.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreatePromptRequest>,
) -> Result<Json<ApiResponse<PromptDto>>, ApiError> {
    auth.authorize(&[Role::Supervisor, Role::Admin])?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Prompt name is required"));
    }
    let prompt_text = serialize_prompt_text(&payload.prompt_text)?;

    let prompt = state
        .store()
        .create_active_prompt(name, &prompt_text)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create prompt: {e}")))?;

    Ok(Json(ApiResponse::success(PromptDto::from(prompt))))
}

#[derive(Deserialize)]
pub struct UpdatePromptRequest {
    pub name: Option<String>,
    pub prompt_text: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// PUT /prompts/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePromptRequest>,
) -> Result<Json<ApiResponse<PromptDto>>, ApiError> {
    auth.authorize(&[Role::Supervisor, Role::Admin])?;

    let name = payload.name.as_deref().map(str::trim);
    if name == Some("") {
        return Err(ApiError::validation("Prompt name cannot be empty"));
    }
    let prompt_text = payload
        .prompt_text
        .as_ref()
        .map(serialize_prompt_text)
        .transpose()?;

    let prompt = state
        .store()
        .update_prompt(id, name, prompt_text.as_deref(), payload.is_active)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update prompt: {e}")))?
        .ok_or_else(|| ApiError::not_found("Prompt", id))?;

    Ok(Json(ApiResponse::success(PromptDto::from(prompt))))
}

/// Prompt bodies are stored as JSON text. Plain strings are kept verbatim so
/// callers can submit raw instructions without an envelope.
fn serialize_prompt_text(value: &serde_json::Value) -> Result<String, ApiError> {
    match value {
        serde_json::Value::Null => Err(ApiError::validation("Prompt text is required")),
        serde_json::Value::String(s) => {
            if s.trim().is_empty() {
                Err(ApiError::validation("Prompt text is required"))
            } else {
                Ok(s.clone())
            }
        }
        other => serde_json::to_string(other)
            .map_err(|e| ApiError::internal(format!("Failed to encode prompt text: {e}"))),
    }
}
