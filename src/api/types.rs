use crate::entities::{invoices, prompts, users};
use base64::Engine;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
}

impl From<users::Model> for UserDto {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            role: model.role,
            status: model.status,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceDto {
    pub id: i32,
    pub invoice_number: String,
    pub user_id: i32,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub reviewed_by: Option<i32>,
    pub reviewer_email: Option<String>,
    pub reviewer_name: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub file_path: Option<String>,
    pub e_tax_status: Option<String>,
    pub cust_code: Option<String>,
    pub pages: Option<String>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub net_total: Option<f64>,
    pub delivery_instructions: Option<String>,
    pub payment_received_by: Option<String>,
    pub received_by_signature: Option<String>,
    pub delivered_by_signature: Option<String>,
    pub has_signatures: Option<String>,
    pub extracted_data: serde_json::Value,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub reviewed_at: Option<String>,
    /// Only populated on the detail endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data_base64: Option<String>,
}

impl InvoiceDto {
    /// Builds the DTO, resolving uploader and reviewer through the given user
    /// lookup. The blob is included only when `with_file_data` is set.
    pub fn build(
        model: invoices::Model,
        users: &HashMap<i32, users::Model>,
        with_file_data: bool,
    ) -> Self {
        let extracted_data = serde_json::from_str(&model.extracted_data)
            .unwrap_or(serde_json::Value::Null);
        let uploader = users.get(&model.user_id);
        let reviewer = model.reviewed_by.and_then(|id| users.get(&id));

        let file_data_base64 = if with_file_data {
            model
                .file_data
                .as_deref()
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
        } else {
            None
        };

        Self {
            id: model.id,
            invoice_number: model.invoice_number,
            user_id: model.user_id,
            user_email: uploader.map(|u| u.email.clone()),
            user_name: uploader.map(|u| u.full_name.clone()),
            reviewed_by: model.reviewed_by,
            reviewer_email: reviewer.map(|u| u.email.clone()),
            reviewer_name: reviewer.map(|u| u.full_name.clone()),
            file_name: model.file_name,
            file_type: model.file_type,
            file_path: model.file_path,
            e_tax_status: model.e_tax_status,
            cust_code: model.cust_code,
            pages: model.pages,
            currency: model.currency,
            payment_method: model.payment_method,
            net_total: model.net_total,
            delivery_instructions: model.delivery_instructions,
            payment_received_by: model.payment_received_by,
            received_by_signature: model.received_by_signature,
            delivered_by_signature: model.delivered_by_signature,
            has_signatures: model.has_signatures,
            extracted_data,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
            reviewed_at: model.reviewed_at,
            file_data_base64,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginationDto {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListDto {
    pub invoices: Vec<InvoiceDto>,
    pub pagination: PaginationDto,
}

#[derive(Debug, Serialize)]
pub struct CreatedInvoiceDto {
    pub message: String,
    pub invoice_id: i32,
    pub invoice_number: String,
    pub extracted_data: serde_json::Value,
    pub json_file: String,
    pub xml_file: String,
}

#[derive(Debug, Serialize)]
pub struct PromptDto {
    pub id: i32,
    pub name: String,
    pub prompt_text: serde_json::Value,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<prompts::Model> for PromptDto {
    fn from(model: prompts::Model) -> Self {
        let prompt_text = serde_json::from_str(&model.prompt_text)
            .unwrap_or(serde_json::Value::String(model.prompt_text.clone()));
        Self {
            id: model.id,
            name: model.name,
            prompt_text,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusCountDto {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MonthlyCountDto {
    pub month: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStatsDto {
    pub total_invoices: u64,
    pub pending_invoices: u64,
    pub approved_invoices: u64,
    pub rejected_invoices: u64,
    pub recent_invoices: Vec<InvoiceDto>,
    pub status_distribution: Vec<StatusCountDto>,
    pub monthly_stats: Vec<MonthlyCountDto>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseDto {
    pub token: String,
    pub user: UserDto,
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub timestamp: String,
}
