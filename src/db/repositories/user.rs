use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::HashMap;
use tokio::task;

use crate::entities::{prelude::*, users};
use crate::models::{Role, UserStatus};

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Creates an account with the given role. The password is hashed off the
    /// async runtime because Argon2 is CPU-intensive.
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: Role,
    ) -> Result<Option<users::Model>> {
        let existing = Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to check for existing email")?;
        if existing.is_some() {
            return Ok(None);
        }

        let password = password.to_string();
        let hash = task::spawn_blocking(move || hash_password(&password))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();
        let active = users::ActiveModel {
            email: Set(email.to_owned()),
            password: Set(hash),
            full_name: Set(full_name.to_owned()),
            role: Set(role.to_string()),
            status: Set(UserStatus::Active.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = Users::insert(active)
            .exec_with_returning(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(Some(model))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")
    }

    pub async fn list(&self) -> Result<Vec<users::Model>> {
        Ok(Users::find()
            .order_by_desc(users::Column::CreatedAt)
            .all(&self.conn)
            .await?)
    }

    pub async fn list_pending(&self) -> Result<Vec<users::Model>> {
        Ok(Users::find()
            .filter(users::Column::Role.eq(Role::Pending.as_str()))
            .order_by_desc(users::Column::CreatedAt)
            .all(&self.conn)
            .await?)
    }

    pub async fn get_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, users::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = Users::find()
            .filter(users::Column::Id.is_in(ids.iter().copied()))
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(|u| (u.id, u)).collect())
    }

    pub async fn set_role(&self, id: i32, role: Role) -> Result<Option<users::Model>> {
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.role = Set(role.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        Ok(Some(active.update(&self.conn).await?))
    }

    pub async fn set_status(&self, id: i32, status: UserStatus) -> Result<Option<users::Model>> {
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        Ok(Some(active.update(&self.conn).await?))
    }

    /// Verify a candidate password against the stored hash.
    /// Runs in `spawn_blocking` to keep the async runtime responsive.
    pub async fn verify_password(&self, user: &users::Model, password: &str) -> Result<bool> {
        let stored_hash = user.password.clone();
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&stored_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

}

/// Hash a password using Argon2id with default params.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
