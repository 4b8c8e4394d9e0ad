//! Voucher issuance, vendor redemption, and the scheduled expiration sweep.

pub mod code;
pub mod domain;
pub mod repository;
pub(crate) mod router;
pub mod service;

pub use domain::{
    RedemptionRequest, TransactionId, Voucher, VoucherCode, VoucherLookup, VoucherStatus,
    VoucherTransaction,
};
pub use repository::VoucherRepository;
pub use service::{SweepReport, VoucherError, VoucherPolicy, VoucherService};
