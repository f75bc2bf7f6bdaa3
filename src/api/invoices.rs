use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::{
    ApiError, ApiResponse, AppState, CreatedInvoiceDto, InvoiceDto, InvoiceListDto, MessageResponse,
    PaginationDto,
};
use crate::db::ListFilter;
use crate::entities::invoices;
use crate::extraction::InvoiceRecord;
use crate::models::{FileType, InvoiceStatus, ReviewAction, Role};
use crate::services::InvoiceInput;

fn created_dto(
    state: &AppState,
    model: &invoices::Model,
    record: &InvoiceRecord,
    message: &str,
) -> CreatedInvoiceDto {
    CreatedInvoiceDto {
        message: message.to_owned(),
        invoice_id: model.id,
        invoice_number: model.invoice_number.clone(),
        extracted_data: serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
        json_file: state
            .exporter()
            .json_path(&model.invoice_number)
            .to_string_lossy()
            .into_owned(),
        xml_file: state
            .exporter()
            .xml_path(&model.invoice_number)
            .to_string_lossy()
            .into_owned(),
    }
}

/// POST /invoices/manual
pub async fn create_manual(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<InvoiceInput>,
) -> Result<Json<ApiResponse<CreatedInvoiceDto>>, ApiError> {
    let (model, record) = state.invoice_service().create_manual(auth.id, payload).await?;
    Ok(Json(ApiResponse::success(created_dto(
        &state,
        &model,
        &record,
        "Invoice created successfully",
    ))))
}

/// POST /invoices/upload
/// Multipart upload with a single `file` part; extraction runs synchronously.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<CreatedInvoiceDto>>, ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .unwrap_or("upload")
                .to_owned();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;
            file = Some((file_name, content_type, bytes.to_vec()));
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| ApiError::validation("No file uploaded"))?;

    let (model, record) = state
        .invoice_service()
        .process_upload(auth.id, &file_name, &content_type, bytes)
        .await?;

    Ok(Json(ApiResponse::success(created_dto(
        &state,
        &model,
        &record,
        "File uploaded and processed successfully",
    ))))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// GET /invoices
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<InvoiceListDto>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<InvoiceStatus>)
        .transpose()
        .map_err(ApiError::validation)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let filter = ListFilter {
        status,
        only_user: None,
        page,
        per_page: limit,
    };

    let (rows, total) = state
        .store()
        .list_invoices(&filter)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list invoices: {e}")))?;

    let invoices = resolve_invoice_dtos(&state, rows, false).await?;

    Ok(Json(ApiResponse::success(InvoiceListDto {
        invoices,
        pagination: PaginationDto {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    })))
}

/// GET /invoices/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<InvoiceDto>>, ApiError> {
    let invoice = state
        .store()
        .get_invoice(id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get invoice: {e}")))?
        .ok_or_else(|| ApiError::not_found("Invoice", id))?;

    let mut dtos = resolve_invoice_dtos(&state, vec![invoice], true).await?;
    Ok(Json(ApiResponse::success(dtos.remove(0))))
}

/// PUT /invoices/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<InvoiceInput>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.invoice_service().update(id, payload).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Invoice updated successfully",
    ))))
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewAction,
}

/// POST /invoices/{id}/review
pub async fn review(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    auth.authorize(&[Role::Supervisor, Role::Admin])?;

    let policy = state.config().read().await.policy.clone();
    state
        .invoice_service()
        .review(id, auth.id, payload.action, &policy)
        .await?;

    let verb = match payload.action {
        ReviewAction::Approve => "approved",
        ReviewAction::Reject => "rejected",
    };
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Invoice {verb} successfully"
    )))))
}

/// POST /invoices/{id}/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let policy = state.config().read().await.policy.clone();
    state
        .invoice_service()
        .cancel(id, auth.id, auth.role, &policy)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Invoice cancelled successfully",
    ))))
}

/// GET /invoices/{id}/file
/// Streams the stored upload back as an attachment.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = state
        .store()
        .get_invoice(id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get invoice: {e}")))?
        .ok_or_else(|| ApiError::not_found("Invoice", id))?;

    let bytes = invoice
        .file_data
        .ok_or_else(|| ApiError::NotFound("Invoice has no stored file".to_string()))?;

    let content_type = if invoice.file_type == FileType::Image.as_str() {
        "image/jpeg"
    } else {
        "application/pdf"
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        invoice.file_name.replace('"', "")
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((StatusCode::OK, headers, bytes))
}

/// Resolves uploader/reviewer display fields for a batch of rows.
pub async fn resolve_invoice_dtos(
    state: &AppState,
    rows: Vec<invoices::Model>,
    with_file_data: bool,
) -> Result<Vec<InvoiceDto>, ApiError> {
    let mut ids: Vec<i32> = rows
        .iter()
        .flat_map(|inv| [Some(inv.user_id), inv.reviewed_by])
        .flatten()
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let users = state
        .store()
        .get_users_by_ids(&ids)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to resolve users: {e}")))?;

    Ok(rows
        .into_iter()
        .map(|inv| InvoiceDto::build(inv, &users, with_file_data))
        .collect())
}
