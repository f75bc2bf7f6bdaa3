use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::entities::{password_reset_tokens, prelude::*, users};

/// Reset tokens live for one hour and are single-use.
const TOKEN_TTL_HOURS: i64 = 1;

pub struct ResetTokenRepository {
    conn: DatabaseConnection,
}

impl ResetTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Issues a fresh token for the user, invalidating any still-outstanding
    /// ones in the same transaction.
    pub async fn issue(&self, user_id: i32) -> Result<String> {
        let txn = self.conn.begin().await?;

        PasswordResetTokens::update_many()
            .col_expr(
                password_reset_tokens::Column::Used,
                sea_orm::sea_query::Expr::value(true),
            )
            .filter(password_reset_tokens::Column::UserId.eq(user_id))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .exec(&txn)
            .await?;

        let token = generate_token();
        let now = Utc::now();
        let active = password_reset_tokens::ActiveModel {
            user_id: Set(user_id),
            token: Set(token.clone()),
            expires_at: Set((now + Duration::hours(TOKEN_TTL_HOURS)).to_rfc3339()),
            used: Set(false),
            created_at: Set(now.to_rfc3339()),
            ..Default::default()
        };
        PasswordResetTokens::insert(active)
            .exec(&txn)
            .await
            .context("Failed to insert reset token")?;

        txn.commit().await?;
        Ok(token)
    }

    /// Redeems a token, writing the pre-hashed replacement password. The
    /// token is burned and the password updated atomically, so a token can
    /// never succeed twice.
    pub async fn consume(&self, token: &str, new_password_hash: String) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let Some(row) = PasswordResetTokens::find()
            .filter(password_reset_tokens::Column::Token.eq(token))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Ok(false);
        };

        if row.expires_at.as_str() < Utc::now().to_rfc3339().as_str() {
            txn.rollback().await?;
            return Ok(false);
        }

        let Some(user) = Users::find_by_id(row.user_id).one(&txn).await? else {
            txn.rollback().await?;
            return Ok(false);
        };

        let now = Utc::now().to_rfc3339();

        let mut token_active: password_reset_tokens::ActiveModel = row.into();
        token_active.used = Set(true);
        token_active.update(&txn).await?;

        let mut user_active: users::ActiveModel = user.into();
        user_active.password = Set(new_password_hash);
        user_active.updated_at = Set(now);
        user_active.update(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }
}

/// Random 64-character hex token.
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
