pub mod export;
pub mod invoice;
pub mod mailer;

pub use export::ExportWriter;
pub use invoice::{InvoiceError, InvoiceInput, InvoiceService};
pub use mailer::Mailer;
