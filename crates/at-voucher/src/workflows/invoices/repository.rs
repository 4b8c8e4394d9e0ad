use super::domain::{Invoice, InvoiceDraft, InvoiceId};
use crate::store::RepositoryError;
use crate::workflows::accounts::UserId;
use crate::workflows::vouchers::VoucherTransaction;

pub trait InvoiceRepository: Send + Sync {
    /// Claim every uninvoiced transaction of the draft's vendor inside its period and store
    /// the invoice, in one step. Returns `None` when there was nothing to claim.
    fn create_invoice(&self, draft: InvoiceDraft) -> Result<Option<Invoice>, RepositoryError>;
    /// Replace `current` with `updated`. Fails with `Conflict` when the stored invoice no
    /// longer equals `current`.
    fn update_invoice(&self, current: &Invoice, updated: Invoice) -> Result<(), RepositoryError>;
    fn fetch_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError>;
    fn invoices_for_vendor(&self, vendor_id: &UserId) -> Result<Vec<Invoice>, RepositoryError>;
    /// Store the cancelled invoice and return its transactions to the uninvoiced pool. Fails
    /// with `Conflict` when the stored invoice no longer equals `current`.
    fn release_invoice(&self, current: &Invoice, cancelled: Invoice) -> Result<(), RepositoryError>;
    fn transactions_for_invoice(
        &self,
        id: &InvoiceId,
    ) -> Result<Vec<VoucherTransaction>, RepositoryError>;
}
