//! Vendor invoicing: rolling uninvoiced redemptions into numbered invoices.

pub mod domain;
pub mod export;
pub mod repository;
pub(crate) mod router;
pub mod service;

pub use domain::{BillingPeriod, Invoice, InvoiceDraft, InvoiceId, InvoiceStatus};
pub use repository::InvoiceRepository;
pub use service::{InvoiceError, InvoiceService};
