//! Program workflows. Each submodule owns its domain types, repository trait, service, and
//! HTTP routes; [`Services`] wires them to one store.

pub mod accounts;
pub mod applications;
pub mod audit;
pub mod evaluations;
pub mod inbound;
pub mod invoices;
pub mod money;
pub mod notifications;
pub mod proofs;
pub(crate) mod sequence;
pub mod services;
pub mod vouchers;

mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use services::{router, ScheduledError, ScheduledRun, Services, Storage};
