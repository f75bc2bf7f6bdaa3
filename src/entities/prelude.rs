pub use super::invoices::Entity as Invoices;
pub use super::password_reset_tokens::Entity as PasswordResetTokens;
pub use super::prompts::Entity as Prompts;
pub use super::users::Entity as Users;
