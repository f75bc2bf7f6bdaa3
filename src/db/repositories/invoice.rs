use crate::entities::{invoices, prelude::*};
use crate::extraction::InvoiceRecord;
use crate::models::InvoiceStatus;
use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use tracing::info;

/// Column values for a freshly created invoice row.
pub struct NewInvoice {
    pub invoice_number: String,
    pub user_id: i32,
    pub file_name: String,
    pub file_type: String,
    pub file_data: Option<Vec<u8>>,
    pub file_path: Option<String>,
    /// `None` for extraction-failure rows, which keep their field columns NULL.
    pub record: Option<InvoiceRecord>,
    pub extracted_data: String,
    pub status: InvoiceStatus,
}

pub enum CreateOutcome {
    Created(invoices::Model),
    DuplicateNumber,
}

pub enum UpdateOutcome {
    Updated(invoices::Model),
    NotFound,
    DuplicateNumber,
}

pub struct ListFilter {
    pub status: Option<InvoiceStatus>,
    /// Restrict to this uploader; `None` means all invoices are visible.
    pub only_user: Option<i32>,
    pub page: u64,
    pub per_page: u64,
}

pub struct InvoiceRepository {
    conn: DatabaseConnection,
}

fn opt(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

fn parse_net_total(value: &str) -> Option<f64> {
    value.trim().replace(',', "").parse().ok()
}

/// Applies record fields onto the invoice columns.
fn apply_record(active: &mut invoices::ActiveModel, record: &InvoiceRecord) {
    active.e_tax_status = Set(opt(&record.e_tax_status));
    active.cust_code = Set(opt(&record.cust_code));
    active.pages = Set(opt(&record.pages));
    active.currency = Set(opt(&record.currency));
    active.payment_method = Set(opt(&record.payment_method));
    active.net_total = Set(parse_net_total(&record.net_total));
    active.delivery_instructions = Set(opt(&record.delivery_instructions));
    active.payment_received_by = Set(opt(&record.payment_received_by));
    active.received_by_signature = Set(opt(&record.received_by_signature));
    active.delivered_by_signature = Set(opt(&record.delivered_by_signature));
    active.has_signatures = Set(opt(&record.has_signatures));
}

impl InvoiceRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts a new invoice, enforcing number uniqueness among non-cancelled
    /// rows. The check and insert run in one transaction; a partial unique
    /// index backstops concurrent writers.
    pub async fn create(&self, input: NewInvoice) -> Result<CreateOutcome> {
        let txn = self.conn.begin().await?;

        let clash = Invoices::find()
            .filter(invoices::Column::InvoiceNumber.eq(input.invoice_number.as_str()))
            .filter(invoices::Column::Status.ne(InvoiceStatus::Cancelled.as_str()))
            .one(&txn)
            .await
            .context("Failed to check invoice number uniqueness")?;

        if clash.is_some() {
            txn.rollback().await?;
            return Ok(CreateOutcome::DuplicateNumber);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let mut active = invoices::ActiveModel {
            invoice_number: Set(input.invoice_number.clone()),
            user_id: Set(input.user_id),
            file_name: Set(input.file_name),
            file_type: Set(input.file_type),
            file_data: Set(input.file_data),
            file_path: Set(input.file_path),
            extracted_data: Set(input.extracted_data),
            status: Set(input.status.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        if let Some(record) = &input.record {
            apply_record(&mut active, record);
        }

        let model = Invoices::insert(active)
            .exec_with_returning(&txn)
            .await
            .context("Failed to insert invoice")?;

        txn.commit().await?;

        info!("Created invoice {} (id {})", input.invoice_number, model.id);
        Ok(CreateOutcome::Created(model))
    }

    pub async fn get(&self, id: i32) -> Result<Option<invoices::Model>> {
        Invoices::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query invoice by ID")
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<(Vec<invoices::Model>, u64)> {
        let mut query = Invoices::find();

        if let Some(status) = filter.status {
            query = query.filter(invoices::Column::Status.eq(status.as_str()));
        }
        if let Some(user_id) = filter.only_user {
            query = query.filter(invoices::Column::UserId.eq(user_id));
        }

        let total = query.clone().count(&self.conn).await?;

        let page = filter.page.max(1);
        let rows = query
            .order_by_desc(invoices::Column::CreatedAt)
            .offset((page - 1) * filter.per_page)
            .limit(filter.per_page)
            .all(&self.conn)
            .await?;

        Ok((rows, total))
    }

    /// Rewrites the editable fields and resubmits the invoice for review.
    /// Number changes are checked against live rows other than this one.
    pub async fn update_fields(
        &self,
        id: i32,
        invoice_number: String,
        record: &InvoiceRecord,
        extracted_data: String,
    ) -> Result<UpdateOutcome> {
        let txn = self.conn.begin().await?;

        let Some(existing) = Invoices::find_by_id(id).one(&txn).await? else {
            txn.rollback().await?;
            return Ok(UpdateOutcome::NotFound);
        };

        let clash = Invoices::find()
            .filter(invoices::Column::InvoiceNumber.eq(invoice_number.as_str()))
            .filter(invoices::Column::Status.ne(InvoiceStatus::Cancelled.as_str()))
            .filter(invoices::Column::Id.ne(id))
            .one(&txn)
            .await?;

        if clash.is_some() {
            txn.rollback().await?;
            return Ok(UpdateOutcome::DuplicateNumber);
        }

        let mut active: invoices::ActiveModel = existing.into();
        active.invoice_number = Set(invoice_number);
        apply_record(&mut active, record);
        active.extracted_data = Set(extracted_data);
        active.status = Set(InvoiceStatus::Review.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = sea_orm::ActiveModelTrait::update(active, &txn).await?;

        txn.commit().await?;
        Ok(UpdateOutcome::Updated(model))
    }

    /// Records the reviewer verdict on an invoice.
    pub async fn set_review(
        &self,
        id: i32,
        reviewer_id: i32,
        status: InvoiceStatus,
    ) -> Result<Option<invoices::Model>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        let now = chrono::Utc::now().to_rfc3339();
        let mut active: invoices::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.reviewed_by = Set(Some(reviewer_id));
        active.reviewed_at = Set(Some(now.clone()));
        active.updated_at = Set(now);

        let model = sea_orm::ActiveModelTrait::update(active, &self.conn).await?;
        Ok(Some(model))
    }

    pub async fn set_status(&self, id: i32, status: InvoiceStatus) -> Result<Option<invoices::Model>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        let mut active: invoices::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = sea_orm::ActiveModelTrait::update(active, &self.conn).await?;
        Ok(Some(model))
    }

    pub async fn count(
        &self,
        status: Option<InvoiceStatus>,
        only_user: Option<i32>,
    ) -> Result<u64> {
        let mut query = Invoices::find();
        if let Some(status) = status {
            query = query.filter(invoices::Column::Status.eq(status.as_str()));
        }
        if let Some(user_id) = only_user {
            query = query.filter(invoices::Column::UserId.eq(user_id));
        }
        Ok(query.count(&self.conn).await?)
    }

    pub async fn recent(&self, limit: u64, only_user: Option<i32>) -> Result<Vec<invoices::Model>> {
        let mut query = Invoices::find();
        if let Some(user_id) = only_user {
            query = query.filter(invoices::Column::UserId.eq(user_id));
        }
        Ok(query
            .order_by_desc(invoices::Column::CreatedAt)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }

    pub async fn status_distribution(&self, only_user: Option<i32>) -> Result<Vec<(String, i64)>> {
        let mut query = Invoices::find()
            .select_only()
            .column(invoices::Column::Status)
            .column_as(invoices::Column::Id.count(), "count")
            .group_by(invoices::Column::Status);
        if let Some(user_id) = only_user {
            query = query.filter(invoices::Column::UserId.eq(user_id));
        }
        Ok(query.into_tuple::<(String, i64)>().all(&self.conn).await?)
    }

    /// Count of invoices created within `[start, end)`, both RFC 3339 strings.
    pub async fn count_created_between(
        &self,
        start: &str,
        end: &str,
        only_user: Option<i32>,
    ) -> Result<u64> {
        let mut query = Invoices::find()
            .filter(invoices::Column::CreatedAt.gte(start))
            .filter(invoices::Column::CreatedAt.lt(end));
        if let Some(user_id) = only_user {
            query = query.filter(invoices::Column::UserId.eq(user_id));
        }
        Ok(query.count(&self.conn).await?)
    }
}
