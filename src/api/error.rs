use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::InvoiceError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    ValidationError(String),

    Conflict(String),

    Unauthorized(String),

    Forbidden(String),

    /// Upstream vision service failed; message carries operator guidance and
    /// `invoice_id` points at the persisted failure row, if one was recorded.
    ExtractionError {
        message: String,
        invoice_id: Option<i32>,
    },

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::ExtractionError { message, .. } => {
                write!(f, "Extraction error: {}", message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, data) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::ExtractionError {
                message,
                invoice_id,
            } => {
                tracing::warn!("Extraction error: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    message,
                    invoice_id.map(|id| serde_json::json!({ "invoice_id": id })),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ApiResponse {
            success: false,
            data,
            error: Some(error_message),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<InvoiceError> for ApiError {
    fn from(err: InvoiceError) -> Self {
        match err {
            InvoiceError::Validation(msg) => ApiError::ValidationError(msg),
            InvoiceError::UnsupportedFile(msg) => ApiError::ValidationError(msg),
            InvoiceError::DuplicateNumber => {
                ApiError::Conflict("Invoice number already exists".to_string())
            }
            InvoiceError::NotFound => ApiError::NotFound("Invoice not found".to_string()),
            InvoiceError::Cancelled => {
                ApiError::Conflict("Cancelled invoices cannot be edited".to_string())
            }
            InvoiceError::NotReviewable => {
                ApiError::Conflict("Invoice is not awaiting review".to_string())
            }
            InvoiceError::NotOwner => {
                ApiError::Forbidden("You can only cancel your own invoices".to_string())
            }
            InvoiceError::NoActivePrompt => {
                ApiError::Conflict("No active prompt found".to_string())
            }
            InvoiceError::ExtractionFailed {
                message,
                invoice_id,
            } => ApiError::ExtractionError {
                message: format!(
                    "Failed to extract invoice data: {message}. File uploaded but extraction \
                     failed. Please try again or enter data manually."
                ),
                invoice_id: Some(invoice_id),
            },
            InvoiceError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", resource, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }
}
