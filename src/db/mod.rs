use crate::entities::{invoices, prompts, users};
use crate::extraction::InvoiceRecord;
use crate::models::{InvoiceStatus, Role, UserStatus};
use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::invoice::{CreateOutcome, ListFilter, NewInvoice, UpdateOutcome};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        // Each pooled in-memory SQLite connection is its own empty database,
        // so the pool must never grow past one connection.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn invoice_repo(&self) -> repositories::invoice::InvoiceRepository {
        repositories::invoice::InvoiceRepository::new(self.conn.clone())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn prompt_repo(&self) -> repositories::prompt::PromptRepository {
        repositories::prompt::PromptRepository::new(self.conn.clone())
    }

    fn reset_token_repo(&self) -> repositories::reset_token::ResetTokenRepository {
        repositories::reset_token::ResetTokenRepository::new(self.conn.clone())
    }

    // ========== Invoices ==========

    pub async fn create_invoice(&self, input: NewInvoice) -> Result<CreateOutcome> {
        self.invoice_repo().create(input).await
    }

    pub async fn get_invoice(&self, id: i32) -> Result<Option<invoices::Model>> {
        self.invoice_repo().get(id).await
    }

    pub async fn list_invoices(&self, filter: &ListFilter) -> Result<(Vec<invoices::Model>, u64)> {
        self.invoice_repo().list(filter).await
    }

    pub async fn update_invoice_fields(
        &self,
        id: i32,
        invoice_number: String,
        record: &InvoiceRecord,
        extracted_data: String,
    ) -> Result<UpdateOutcome> {
        self.invoice_repo()
            .update_fields(id, invoice_number, record, extracted_data)
            .await
    }

    pub async fn set_invoice_review(
        &self,
        id: i32,
        reviewer_id: i32,
        status: InvoiceStatus,
    ) -> Result<Option<invoices::Model>> {
        self.invoice_repo().set_review(id, reviewer_id, status).await
    }

    pub async fn set_invoice_status(
        &self,
        id: i32,
        status: InvoiceStatus,
    ) -> Result<Option<invoices::Model>> {
        self.invoice_repo().set_status(id, status).await
    }

    pub async fn count_invoices(
        &self,
        status: Option<InvoiceStatus>,
        only_user: Option<i32>,
    ) -> Result<u64> {
        self.invoice_repo().count(status, only_user).await
    }

    pub async fn recent_invoices(
        &self,
        limit: u64,
        only_user: Option<i32>,
    ) -> Result<Vec<invoices::Model>> {
        self.invoice_repo().recent(limit, only_user).await
    }

    pub async fn invoice_status_distribution(
        &self,
        only_user: Option<i32>,
    ) -> Result<Vec<(String, i64)>> {
        self.invoice_repo().status_distribution(only_user).await
    }

    pub async fn count_invoices_created_between(
        &self,
        start: &str,
        end: &str,
        only_user: Option<i32>,
    ) -> Result<u64> {
        self.invoice_repo()
            .count_created_between(start, end, only_user)
            .await
    }

    // ========== Users ==========

    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: Role,
    ) -> Result<Option<users::Model>> {
        self.user_repo().create(email, password, full_name, role).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn list_users(&self) -> Result<Vec<users::Model>> {
        self.user_repo().list().await
    }

    pub async fn list_pending_users(&self) -> Result<Vec<users::Model>> {
        self.user_repo().list_pending().await
    }

    pub async fn get_users_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, users::Model>> {
        self.user_repo().get_by_ids(ids).await
    }

    pub async fn set_user_role(&self, id: i32, role: Role) -> Result<Option<users::Model>> {
        self.user_repo().set_role(id, role).await
    }

    pub async fn set_user_status(
        &self,
        id: i32,
        status: UserStatus,
    ) -> Result<Option<users::Model>> {
        self.user_repo().set_status(id, status).await
    }

    pub async fn verify_user_password(
        &self,
        user: &users::Model,
        password: &str,
    ) -> Result<bool> {
        self.user_repo().verify_password(user, password).await
    }

    // ========== Prompts ==========

    pub async fn get_active_prompt(&self) -> Result<Option<prompts::Model>> {
        self.prompt_repo().get_active().await
    }

    pub async fn list_prompts(&self) -> Result<Vec<prompts::Model>> {
        self.prompt_repo().list().await
    }

    pub async fn create_active_prompt(
        &self,
        name: &str,
        prompt_text: &str,
    ) -> Result<prompts::Model> {
        self.prompt_repo().create_active(name, prompt_text).await
    }

    pub async fn update_prompt(
        &self,
        id: i32,
        name: Option<&str>,
        prompt_text: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Option<prompts::Model>> {
        self.prompt_repo()
            .update(id, name, prompt_text, is_active)
            .await
    }

    // ========== Password reset ==========

    pub async fn issue_reset_token(&self, user_id: i32) -> Result<String> {
        self.reset_token_repo().issue(user_id).await
    }

    pub async fn redeem_reset_token(&self, token: &str, new_password: &str) -> Result<bool> {
        let password = new_password.to_string();
        let hash = tokio::task::spawn_blocking(move || {
            repositories::user::hash_password(&password)
        })
        .await??;
        self.reset_token_repo().consume(token, hash).await
    }
}
