use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Business key. At most one non-cancelled row may hold a given number;
    /// cancelled numbers become reusable by new rows.
    #[sea_orm(indexed)]
    pub invoice_number: String,

    pub user_id: i32,

    pub reviewed_by: Option<i32>,

    pub file_name: String,

    /// One of `image`, `pdf`, `manual`
    pub file_type: String,

    /// Raw uploaded bytes, owned exclusively by this row
    #[sea_orm(column_type = "Blob", nullable)]
    pub file_data: Option<Vec<u8>>,

    /// Transient on-disk copy of the upload, if any
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

    /// Derived: "Yes" iff either signature field is "Yes"
    pub has_signatures: Option<String>,

    /// JSON snapshot of the extracted record, kept in sync with the columns
    pub extracted_data: String,

    /// One of `pending`, `review`, `approved`, `rejected`, `cancelled`
    pub status: String,

    pub created_at: String,

    pub updated_at: String,

    pub reviewed_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
