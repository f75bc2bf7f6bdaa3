use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation;
use super::{ApiError, ApiResponse, AppState, LoginResponseDto, MessageResponse, UserDto};
use crate::entities::users;
use crate::models::{Role, UserStatus};

const NEUTRAL_RESET_MESSAGE: &str = "If that email exists, a password reset link has been sent.";

// ============================================================================
// Tokens
// ============================================================================

/// Bearer token claims; `exp` is seconds since the epoch.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: i32,
    pub email: String,
    pub role: String,
    pub exp: i64,
}

pub fn sign_token(user: &users::Model, secret: &str, ttl_days: i64) -> Result<String, ApiError> {
    let claims = Claims {
        id: user.id,
        email: user.email.clone(),
        role: user.role.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to sign token: {e}")))
}

pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Authenticated caller identity, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// Role gate for privileged endpoints.
    pub fn authorize(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Access denied. Insufficient permissions.".to_string(),
            ))
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Requires a valid `Authorization: Bearer <token>` header and attaches the
/// caller as an [`AuthUser`] extension.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".to_string()))?;

    let secret = state.jwt_secret().await;
    let claims = verify_token(token, &secret)
        .ok_or_else(|| ApiError::Unauthorized("Token is not valid".to_string()))?;

    let role = claims
        .role
        .parse::<Role>()
        .map_err(|_| ApiError::Unauthorized("Token is not valid".to_string()))?;

    request.extensions_mut().insert(AuthUser {
        id: claims.id,
        email: claims.email,
        role,
    });

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: i32,
}

/// POST /auth/register
/// New accounts start with the `pending` role until an admin approves them.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, ApiError> {
    validation::validate_email(&payload.email)?;
    validation::validate_password(&payload.password)?;

    let user = state
        .store()
        .create_user(
            payload.email.trim(),
            &payload.password,
            payload.full_name.trim(),
            Role::Pending,
        )
        .await
        .map_err(|e| ApiError::internal(format!("Registration failed: {e}")))?
        .ok_or_else(|| ApiError::Conflict("User already exists".to_string()))?;

    tracing::info!("Registered new account {} (id {})", user.email, user.id);

    Ok(Json(ApiResponse::success(RegisterResponse {
        message: "Registration successful. Waiting for admin approval.".to_string(),
        user_id: user.id,
    })))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponseDto>>, ApiError> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let user = state
        .store()
        .get_user_by_email(&payload.email)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    if user.status != UserStatus::Active.as_str() {
        return Err(ApiError::Unauthorized("Account is inactive".to_string()));
    }

    let is_valid = state
        .store()
        .verify_user_password(&user, &payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?;

    if !is_valid {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let (secret, ttl_days) = {
        let config = state.config().read().await;
        (config.auth.secret(), config.auth.token_ttl_days)
    };
    let token = sign_token(&user, &secret, ttl_days)?;

    Ok(Json(ApiResponse::success(LoginResponseDto {
        token,
        user: user.into(),
    })))
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth): axum::Extension<AuthUser>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user = state
        .store()
        .get_user_by_id(auth.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::success(user.into())))
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// POST /auth/forgot-password
/// Responds identically whether or not the account exists.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }

    let user = state
        .store()
        .get_user_by_email(&payload.email)
        .await
        .map_err(|e| ApiError::internal(format!("Reset request failed: {e}")))?;

    if let Some(user) = user {
        let token = state
            .store()
            .issue_reset_token(user.id)
            .await
            .map_err(|e| ApiError::internal(format!("Reset request failed: {e}")))?;
        state.mailer().send_password_reset(&user.email, &token);
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        NEUTRAL_RESET_MESSAGE,
    ))))
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.token.is_empty() {
        return Err(ApiError::validation("Token and password are required"));
    }
    validation::validate_password(&payload.password)?;

    let redeemed = state
        .store()
        .redeem_reset_token(&payload.token, &payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Password reset failed: {e}")))?;

    if !redeemed {
        return Err(ApiError::validation(
            "Invalid or expired reset token. Please request a new one.",
        ));
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password has been reset successfully.",
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> users::Model {
        users::Model {
            id: 7,
            email: "clerk@example.com".to_string(),
            password: "hash".to_string(),
            full_name: "Clerk".to_string(),
            role: "user".to_string(),
            status: "active".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let token = sign_token(&sample_user(), "secret", 7).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.email, "clerk@example.com");
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let token = sign_token(&sample_user(), "secret", 7).unwrap();
        assert!(verify_token(&token, "other-secret").is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let claims = Claims {
            id: 7,
            email: "clerk@example.com".to_string(),
            role: "user".to_string(),
            exp: (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(verify_token(&token, "secret").is_none());
    }

    #[test]
    fn test_authorize_gates_by_role() {
        let auth = AuthUser {
            id: 1,
            email: "clerk@example.com".to_string(),
            role: Role::User,
        };
        assert!(auth.authorize(&[Role::User, Role::Admin]).is_ok());
        assert!(auth.authorize(&[Role::Supervisor, Role::Admin]).is_err());
    }
}
