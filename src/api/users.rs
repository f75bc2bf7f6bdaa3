use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::{ApiError, ApiResponse, AppState, UserDto};
use crate::models::{Role, UserStatus};

/// GET /users
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    auth.authorize(&[Role::Admin])?;

    let users = state
        .store()
        .list_users()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list users: {e}")))?;

    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserDto::from).collect(),
    )))
}

/// GET /users/pending
pub async fn pending(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    auth.authorize(&[Role::Admin])?;

    let users = state
        .store()
        .list_pending_users()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list pending users: {e}")))?;

    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserDto::from).collect(),
    )))
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

/// PUT /users/{id}/role
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.authorize(&[Role::Admin])?;

    let role: Role = payload.role.parse().map_err(ApiError::validation)?;

    let user = state
        .store()
        .set_user_role(id, role)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update role: {e}")))?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

/// PUT /users/{id}/status
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.authorize(&[Role::Admin])?;

    let status: UserStatus = payload.status.parse().map_err(ApiError::validation)?;

    let user = state
        .store()
        .set_user_status(id, status)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update status: {e}")))?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}
