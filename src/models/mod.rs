pub mod invoice;
pub mod user;

pub use invoice::{FileType, InvoiceStatus, ReviewAction};
pub use user::{Role, UserStatus};
