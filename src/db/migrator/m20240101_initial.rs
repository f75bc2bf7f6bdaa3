use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

const DEFAULT_ADMIN_EMAIL: &str = "admin@factura.local";
const DEFAULT_PROMPT_NAME: &str = "Default Invoice Extraction Prompt";

/// Hash the default admin password using Argon2id
fn hash_default_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let password = b"admin123";
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password, &salt)
        .expect("Failed to hash default password")
        .to_string()
}

fn default_prompt_payload() -> String {
    let instructions = concat!(
        "Read the attached invoice document carefully, every character and every number, ",
        "then extract the following fields.\n\n",
        "1. e_tax_status: \"E-TAX\" if the text E-TAX appears above the barcode, otherwise \"Non E-TAX\".\n",
        "2. invoice_number: the invoice number, usually near the barcode or invoice header.\n",
        "3. cust_code: the CUST CODE exactly as printed. Do not modify, correct, or guess unclear text.\n",
        "4. pages: the PAGES value (e.g. 1/1, 2/2).\n",
        "5. currency: the CURRENCY value.\n",
        "6. payment_method: the PAYMENT METHOD value.\n",
        "7. net_total: the exact net total amount shown on the document.\n",
        "8. delivery_instructions: all text under the Delivery Instructions header, verbatim.\n",
        "9. payment_received_by: the selected payment option and any text written next to it.\n",
        "10. received_by_signature: \"Yes\" if a signature and date are present at RECEIVED BY, otherwise \"No\".\n",
        "11. delivered_by_signature: \"Yes\" if a signature and date are present at DELIVERY BY, otherwise \"No\".\n\n",
        "IMPORTANT: You MUST return ONLY valid JSON with ALL fields. Do not include any text ",
        "before or after the JSON. If a field cannot be found, use an empty string \"\". ",
        "Do not omit any fields."
    );
    serde_json::json!({ "instructions": instructions }).to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Invoices)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Prompts)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(PasswordResetTokens)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Invoice numbers are unique among live rows only; cancelling an
        // invoice frees its number for reuse.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_invoices_number_live \
                 ON invoices (invoice_number) WHERE status != 'cancelled'",
            )
            .await?;

        let now = chrono::Utc::now().to_rfc3339();

        // Seed admin account
        let insert_admin = sea_orm_migration::sea_query::Query::insert()
            .into_table(Users)
            .columns([
                crate::entities::users::Column::Email,
                crate::entities::users::Column::Password,
                crate::entities::users::Column::FullName,
                crate::entities::users::Column::Role,
                crate::entities::users::Column::Status,
                crate::entities::users::Column::CreatedAt,
                crate::entities::users::Column::UpdatedAt,
            ])
            .values_panic([
                DEFAULT_ADMIN_EMAIL.into(),
                hash_default_password().into(),
                "System Administrator".into(),
                "admin".into(),
                "active".into(),
                now.clone().into(),
                now.clone().into(),
            ])
            .to_owned();

        manager.exec_stmt(insert_admin).await?;

        // Seed the active extraction prompt
        let insert_prompt = sea_orm_migration::sea_query::Query::insert()
            .into_table(Prompts)
            .columns([
                crate::entities::prompts::Column::Name,
                crate::entities::prompts::Column::PromptText,
                crate::entities::prompts::Column::IsActive,
                crate::entities::prompts::Column::CreatedAt,
                crate::entities::prompts::Column::UpdatedAt,
            ])
            .values_panic([
                DEFAULT_PROMPT_NAME.into(),
                default_prompt_payload().into(),
                true.into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert_prompt).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PasswordResetTokens).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Prompts).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoices).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
