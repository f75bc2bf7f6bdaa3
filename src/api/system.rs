use axum::Json;
use chrono::Utc;

use super::{ApiResponse, HealthDto};

/// GET /health
pub async fn health() -> Json<ApiResponse<HealthDto>> {
    Json(ApiResponse::success(HealthDto {
        status: "OK".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
