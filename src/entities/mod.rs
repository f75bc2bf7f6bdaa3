pub mod prelude;

pub mod invoices;
pub mod password_reset_tokens;
pub mod prompts;
pub mod users;
