//! Invoice lifecycle: intake (manual, upload+extraction), edits, review
//! verdicts, and cancellation.

use crate::clients::VisionClient;
use crate::config::{PolicyConfig, StorageConfig};
use crate::db::{CreateOutcome, NewInvoice, Store, UpdateOutcome};
use crate::entities::invoices;
use crate::extraction::{self, InvoiceRecord};
use crate::models::{FileType, InvoiceStatus, ReviewAction, Role};
use crate::services::export::ExportWriter;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// Errors specific to invoice operations.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Invoice number already exists")]
    DuplicateNumber,

    #[error("Invoice not found")]
    NotFound,

    #[error("Cancelled invoices cannot be edited")]
    Cancelled,

    #[error("Invoice is not awaiting review")]
    NotReviewable,

    #[error("You can only cancel your own invoices")]
    NotOwner,

    #[error("No active prompt found")]
    NoActivePrompt,

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    /// The upload was persisted for manual follow-up, but extraction failed.
    #[error("Failed to extract invoice data: {message}")]
    ExtractionFailed { message: String, invoice_id: i32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for InvoiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Client-supplied invoice fields for manual entry and edits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceInput {
    pub invoice_number: Option<String>,
    pub e_tax_status: Option<String>,
    pub cust_code: Option<String>,
    pub pages: Option<String>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub net_total: Option<String>,
    pub delivery_instructions: Option<String>,
    pub payment_received_by: Option<String>,
    pub received_by_signature: Option<String>,
    pub delivered_by_signature: Option<String>,
}

impl InvoiceInput {
    /// Builds the normalized record; `has_signatures` is always derived, never
    /// taken from the client.
    fn into_record(self, invoice_number: String) -> InvoiceRecord {
        let field = |v: Option<String>| v.unwrap_or_default();
        let mut record = InvoiceRecord {
            e_tax_status: field(self.e_tax_status),
            invoice_number,
            cust_code: field(self.cust_code),
            pages: field(self.pages),
            currency: field(self.currency),
            payment_method: field(self.payment_method),
            net_total: field(self.net_total),
            delivery_instructions: field(self.delivery_instructions),
            payment_received_by: field(self.payment_received_by),
            received_by_signature: field(self.received_by_signature),
            delivered_by_signature: field(self.delivered_by_signature),
            has_signatures: String::new(),
        };
        record.recompute_signatures();
        record
    }
}

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "png", "gif", "pdf"];

#[derive(Clone)]
pub struct InvoiceService {
    store: Store,
    exporter: ExportWriter,
    vision: VisionClient,
    uploads_dir: PathBuf,
}

impl InvoiceService {
    #[must_use]
    pub fn new(
        store: Store,
        exporter: ExportWriter,
        vision: VisionClient,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            store,
            exporter,
            vision,
            uploads_dir: PathBuf::from(&storage.uploads_path),
        }
    }

    /// Creates an invoice from manually entered fields. Starts in `pending`
    /// and writes both export files.
    pub async fn create_manual(
        &self,
        user_id: i32,
        input: InvoiceInput,
    ) -> Result<(invoices::Model, InvoiceRecord), InvoiceError> {
        let number = input
            .invoice_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| InvoiceError::Validation("Invoice number is required".into()))?;

        let record = input.into_record(number.clone());
        let extracted_data = serde_json::to_string(&record)
            .map_err(|e| InvoiceError::Internal(e.to_string()))?;

        let outcome = self
            .store
            .create_invoice(NewInvoice {
                invoice_number: number.clone(),
                user_id,
                file_name: "manual_entry.txt".into(),
                file_type: FileType::Manual.to_string(),
                file_data: None,
                file_path: None,
                record: Some(record.clone()),
                extracted_data,
                status: InvoiceStatus::Pending,
            })
            .await?;

        let model = match outcome {
            CreateOutcome::Created(model) => model,
            CreateOutcome::DuplicateNumber => return Err(InvoiceError::DuplicateNumber),
        };

        self.exporter.write(&number, &record).await?;
        Ok((model, record))
    }

    /// Runs vision extraction on an uploaded file and persists the result.
    ///
    /// Extraction failures still persist the upload (with an `ERROR_` number
    /// and the error message as its extracted data) so the file can be
    /// re-entered manually.
    pub async fn process_upload(
        &self,
        user_id: i32,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(invoices::Model, InvoiceRecord), InvoiceError> {
        let extension = file_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(InvoiceError::UnsupportedFile(
                "Only image files (JPEG, JPG, PNG, GIF) and PDF files are allowed".into(),
            ));
        }

        let file_type = FileType::from_mime(content_type);
        let file_path = self.stash_upload(&extension, &bytes).await;

        if file_type == FileType::Pdf {
            let message = "PDF processing requires image conversion. Please convert PDF to \
                           image format (PNG/JPEG) or use manual entry."
                .to_owned();
            let id = self
                .persist_failure(user_id, file_name, file_type, bytes, file_path, &message)
                .await?;
            return Err(InvoiceError::ExtractionFailed {
                message,
                invoice_id: id,
            });
        }

        let prompt = self
            .store
            .get_active_prompt()
            .await?
            .ok_or(InvoiceError::NoActivePrompt)?;
        let instructions = prompt_instructions(&prompt.prompt_text);

        let raw = match self.vision.extract(&instructions, &bytes).await {
            Ok(raw) => raw,
            Err(err) => {
                let message = err.to_string();
                warn!("Extraction failed for {file_name}: {message}");
                let id = self
                    .persist_failure(user_id, file_name, file_type, bytes, file_path, &message)
                    .await?;
                return Err(InvoiceError::ExtractionFailed {
                    message,
                    invoice_id: id,
                });
            }
        };

        let mut record = extraction::normalize(&raw);
        if record.invoice_number.trim().is_empty() {
            record.invoice_number = format!("INV_{}", chrono::Utc::now().timestamp_millis());
        }
        let number = record.invoice_number.clone();
        let extracted_data = serde_json::to_string(&record)
            .map_err(|e| InvoiceError::Internal(e.to_string()))?;

        let outcome = self
            .store
            .create_invoice(NewInvoice {
                invoice_number: number.clone(),
                user_id,
                file_name: file_name.to_owned(),
                file_type: file_type.to_string(),
                file_data: Some(bytes),
                file_path,
                record: Some(record.clone()),
                extracted_data,
                status: InvoiceStatus::Pending,
            })
            .await?;

        let model = match outcome {
            CreateOutcome::Created(model) => model,
            CreateOutcome::DuplicateNumber => return Err(InvoiceError::DuplicateNumber),
        };

        self.exporter.write(&number, &record).await?;
        Ok((model, record))
    }

    /// Edits an invoice and resubmits it for review. Cancelled invoices are
    /// immutable.
    pub async fn update(
        &self,
        id: i32,
        input: InvoiceInput,
    ) -> Result<(invoices::Model, InvoiceRecord), InvoiceError> {
        let existing = self
            .store
            .get_invoice(id)
            .await?
            .ok_or(InvoiceError::NotFound)?;

        if existing.status == InvoiceStatus::Cancelled.as_str() {
            return Err(InvoiceError::Cancelled);
        }

        let number = input
            .invoice_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| existing.invoice_number.clone(), str::to_owned);

        let record = input.into_record(number.clone());
        let extracted_data = serde_json::to_string(&record)
            .map_err(|e| InvoiceError::Internal(e.to_string()))?;

        let outcome = self
            .store
            .update_invoice_fields(id, number.clone(), &record, extracted_data)
            .await?;

        let model = match outcome {
            UpdateOutcome::Updated(model) => model,
            UpdateOutcome::NotFound => return Err(InvoiceError::NotFound),
            UpdateOutcome::DuplicateNumber => return Err(InvoiceError::DuplicateNumber),
        };

        self.exporter.write(&number, &record).await?;
        Ok((model, record))
    }

    /// Applies a reviewer verdict. With `require_review_status` set, only
    /// invoices currently in `review` accept a verdict.
    pub async fn review(
        &self,
        id: i32,
        reviewer_id: i32,
        action: ReviewAction,
        policy: &PolicyConfig,
    ) -> Result<invoices::Model, InvoiceError> {
        if policy.require_review_status {
            let invoice = self
                .store
                .get_invoice(id)
                .await?
                .ok_or(InvoiceError::NotFound)?;
            if invoice.status != InvoiceStatus::Review.as_str() {
                return Err(InvoiceError::NotReviewable);
            }
        }

        self.store
            .set_invoice_review(id, reviewer_id, action.resulting_status())
            .await?
            .ok_or(InvoiceError::NotFound)
    }

    /// Cancels an invoice, freeing its number for reuse.
    pub async fn cancel(
        &self,
        id: i32,
        actor_id: i32,
        actor_role: Role,
        policy: &PolicyConfig,
    ) -> Result<invoices::Model, InvoiceError> {
        if policy.cancel_requires_ownership && !actor_role.sees_all_invoices() {
            let invoice = self
                .store
                .get_invoice(id)
                .await?
                .ok_or(InvoiceError::NotFound)?;
            if invoice.user_id != actor_id {
                return Err(InvoiceError::NotOwner);
            }
        }

        self.store
            .set_invoice_status(id, InvoiceStatus::Cancelled)
            .await?
            .ok_or(InvoiceError::NotFound)
    }

    async fn persist_failure(
        &self,
        user_id: i32,
        file_name: &str,
        file_type: FileType,
        bytes: Vec<u8>,
        file_path: Option<String>,
        message: &str,
    ) -> Result<i32, InvoiceError> {
        let number = format!("ERROR_{}", chrono::Utc::now().timestamp_millis());
        let extracted_data = serde_json::json!({ "error": message }).to_string();

        let outcome = self
            .store
            .create_invoice(NewInvoice {
                invoice_number: number,
                user_id,
                file_name: file_name.to_owned(),
                file_type: file_type.to_string(),
                file_data: Some(bytes),
                file_path,
                record: None,
                extracted_data,
                status: InvoiceStatus::Pending,
            })
            .await?;

        match outcome {
            CreateOutcome::Created(model) => Ok(model.id),
            CreateOutcome::DuplicateNumber => Err(InvoiceError::Internal(
                "Failed to record extraction failure".into(),
            )),
        }
    }

    /// Best-effort on-disk copy of the upload. The blob column is the source
    /// of truth, so a write failure only logs.
    async fn stash_upload(&self, extension: &str, bytes: &[u8]) -> Option<String> {
        if let Err(err) = tokio::fs::create_dir_all(&self.uploads_dir).await {
            error!("Failed to create uploads directory: {err}");
            return None;
        }
        let path = self
            .uploads_dir
            .join(format!("{}.{extension}", uuid::Uuid::new_v4()));
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(err) => {
                error!("Failed to stash upload at {}: {err}", path.display());
                None
            }
        }
    }
}

/// Prompt rows hold a JSON envelope with an `instructions` key; legacy rows
/// may be plain text.
#[must_use]
pub fn prompt_instructions(prompt_text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(prompt_text)
        .ok()
        .and_then(|v| {
            v.get("instructions")
                .and_then(|i| i.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| prompt_text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_instructions_json_envelope() {
        let text = r#"{"instructions": "Extract the fields"}"#;
        assert_eq!(prompt_instructions(text), "Extract the fields");
    }

    #[test]
    fn test_prompt_instructions_plain_text() {
        assert_eq!(prompt_instructions("just do it"), "just do it");
    }

    #[test]
    fn test_input_derives_signatures() {
        let input = InvoiceInput {
            received_by_signature: Some("Yes".into()),
            ..Default::default()
        };
        let record = input.into_record("INV-1".into());
        assert_eq!(record.has_signatures, "Yes");
        assert_eq!(record.invoice_number, "INV-1");
    }
}
