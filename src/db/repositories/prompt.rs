use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::entities::{prelude::*, prompts};

pub struct PromptRepository {
    conn: DatabaseConnection,
}

impl PromptRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_active(&self) -> Result<Option<prompts::Model>> {
        Prompts::find()
            .filter(prompts::Column::IsActive.eq(true))
            .order_by_desc(prompts::Column::UpdatedAt)
            .one(&self.conn)
            .await
            .context("Failed to query active prompt")
    }

    pub async fn list(&self) -> Result<Vec<prompts::Model>> {
        Ok(Prompts::find()
            .order_by_desc(prompts::Column::UpdatedAt)
            .all(&self.conn)
            .await?)
    }

    /// Creates a prompt as the single active one. Deactivation of the others
    /// and the insert commit together, so exactly one prompt stays active.
    pub async fn create_active(&self, name: &str, prompt_text: &str) -> Result<prompts::Model> {
        let txn = self.conn.begin().await?;

        Prompts::update_many()
            .col_expr(prompts::Column::IsActive, sea_orm::sea_query::Expr::value(false))
            .exec(&txn)
            .await?;

        let now = chrono::Utc::now().to_rfc3339();
        let active = prompts::ActiveModel {
            name: Set(name.to_owned()),
            prompt_text: Set(prompt_text.to_owned()),
            is_active: Set(true),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = Prompts::insert(active).exec_with_returning(&txn).await?;

        txn.commit().await?;
        Ok(model)
    }

    /// Applies a partial update. Activating a prompt deactivates every other
    /// prompt in the same transaction.
    pub async fn update(
        &self,
        id: i32,
        name: Option<&str>,
        prompt_text: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Option<prompts::Model>> {
        let txn = self.conn.begin().await?;

        let Some(prompt) = Prompts::find_by_id(id).one(&txn).await? else {
            txn.rollback().await?;
            return Ok(None);
        };

        if is_active == Some(true) {
            Prompts::update_many()
                .col_expr(prompts::Column::IsActive, sea_orm::sea_query::Expr::value(false))
                .filter(prompts::Column::Id.ne(id))
                .exec(&txn)
                .await?;
        }

        let mut active: prompts::ActiveModel = prompt.into();
        if let Some(name) = name {
            active.name = Set(name.to_owned());
        }
        if let Some(text) = prompt_text {
            active.prompt_text = Set(text.to_owned());
        }
        if let Some(flag) = is_active {
            active.is_active = Set(flag);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active.update(&txn).await?;

        txn.commit().await?;
        Ok(Some(model))
    }
}
