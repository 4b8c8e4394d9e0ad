//! Administration backend for an assistive-technology voucher program.
//!
//! Constituents apply and upload proof of eligibility, administrators review it,
//! evaluators recommend equipment, vendors redeem vouchers, and every step is
//! announced to the affected user over their preferred delivery channel.

pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
