use chrono::{DateTime, Utc};

use super::domain::{Voucher, VoucherCode, VoucherTransaction};
use crate::store::RepositoryError;
use crate::workflows::applications::ApplicationId;

pub trait VoucherRepository: Send + Sync {
    /// Fails with `Conflict` if the code is already taken.
    fn insert_voucher(&self, voucher: Voucher) -> Result<Voucher, RepositoryError>;
    /// Replace `current` with `updated`. Fails with `Conflict` when the stored voucher no
    /// longer equals `current`.
    fn update_voucher(&self, current: &Voucher, updated: Voucher) -> Result<(), RepositoryError>;
    fn fetch_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>, RepositoryError>;
    fn vouchers_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Voucher>, RepositoryError>;
    /// Active vouchers expiring at or before `cutoff`.
    fn active_vouchers_expiring_by(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Voucher>, RepositoryError>;
    /// Persist the debited voucher and its transaction atomically. Fails with `Conflict` when
    /// the stored balance no longer matches `expected_remaining_cents`.
    fn record_redemption(
        &self,
        voucher: Voucher,
        expected_remaining_cents: u64,
        transaction: VoucherTransaction,
    ) -> Result<(), RepositoryError>;
    fn transactions_for_voucher(
        &self,
        code: &VoucherCode,
    ) -> Result<Vec<VoucherTransaction>, RepositoryError>;
}
