pub mod invoice;
pub mod prompt;
pub mod reset_token;
pub mod user;
