use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::RepositoryError;
use crate::workflows::accounts::{
    CredentialStore, PasswordResetToken, ResetTokenRepository, User, UserId, UserRepository,
    UserRole,
};
use crate::workflows::applications::{
    Application, ApplicationId, ApplicationRepository, ApplicationStatus,
};
use crate::workflows::audit::{Event, EventLog};
use crate::workflows::evaluations::{Evaluation, EvaluationId, EvaluationRepository};
use crate::workflows::invoices::{Invoice, InvoiceDraft, InvoiceId, InvoiceRepository, InvoiceStatus};
use crate::workflows::notifications::{Notification, NotificationId, NotificationRepository};
use crate::workflows::proofs::{
    DocumentStore, ProofRateLimiter, ProofRepository, ProofReview, ProofSubmission,
    ProofSubmissionAudit, SubmissionWrite, SubmissionWriteError,
};
use crate::workflows::vouchers::{
    TransactionId, Voucher, VoucherCode, VoucherRepository, VoucherStatus, VoucherTransaction,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    passwords: HashMap<UserId, String>,
    reset_tokens: HashMap<String, PasswordResetToken>,
    events: Vec<Event>,
    applications: HashMap<ApplicationId, Application>,
    submissions: Vec<ProofSubmission>,
    submission_audits: Vec<ProofSubmissionAudit>,
    reviews: Vec<ProofReview>,
    documents: HashMap<String, Vec<u8>>,
    evaluations: HashMap<EvaluationId, Evaluation>,
    vouchers: HashMap<VoucherCode, Voucher>,
    transactions: HashMap<TransactionId, VoucherTransaction>,
    invoices: HashMap<InvoiceId, Invoice>,
    invoice_numbers: HashMap<String, u32>,
    notifications: HashMap<NotificationId, Notification>,
}

/// Process-local store behind every repository trait. One lock guards all tables, so the
/// multi-record operations (redemption, invoice claims, proof submissions) are atomic. Updates
/// carry the row as it was read and fail with `Conflict` if it has changed since.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store mutex poisoned")
    }

    /// Last password handed to the credential store for `user_id`.
    pub fn password_for(&self, user_id: &UserId) -> Option<String> {
        self.lock().passwords.get(user_id).cloned()
    }
}

fn sorted<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    rows
}

/// Compare-and-set on one row: `updated` lands only if the row still equals `current`.
fn replace<K: Eq + Hash, V: PartialEq>(
    table: &mut HashMap<K, V>,
    key: &K,
    current: &V,
    updated: V,
) -> Result<(), RepositoryError> {
    match table.get_mut(key) {
        Some(existing) if existing == current => {
            *existing = updated;
            Ok(())
        }
        Some(_) => Err(RepositoryError::Conflict),
        None => Err(RepositoryError::NotFound),
    }
}

impl UserRepository for MemoryStore {
    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut state = self.lock();
        let email_taken = state
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email));
        if state.users.contains_key(&user.id) || email_taken {
            return Err(RepositoryError::Conflict);
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.get(id).cloned())
    }

    fn update_user(&self, current: &User, updated: User) -> Result<(), RepositoryError> {
        replace(&mut self.lock().users, &current.id, current, updated)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    fn users_with_role(&self, role: UserRole) -> Result<Vec<User>, RepositoryError> {
        let users = self
            .lock()
            .users
            .values()
            .filter(|user| user.role == role)
            .cloned()
            .collect();
        Ok(sorted(users, |user: &User| user.id.clone()))
    }
}

impl CredentialStore for MemoryStore {
    fn set_password(&self, user_id: &UserId, password: &str) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if !state.users.contains_key(user_id) {
            return Err(RepositoryError::NotFound);
        }
        state.passwords.insert(user_id.clone(), password.to_string());
        Ok(())
    }
}

impl ResetTokenRepository for MemoryStore {
    fn insert_token(&self, token: PasswordResetToken) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.reset_tokens.contains_key(&token.digest) {
            return Err(RepositoryError::Conflict);
        }
        state.reset_tokens.insert(token.digest.clone(), token);
        Ok(())
    }

    fn consume_token(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PasswordResetToken>, RepositoryError> {
        let mut state = self.lock();
        match state.reset_tokens.get_mut(digest) {
            Some(token) if token.is_usable(now) => {
                token.used_at = Some(now);
                Ok(Some(token.clone()))
            }
            _ => Ok(None),
        }
    }
}

impl EventLog for MemoryStore {
    fn append_event(&self, event: Event) -> Result<(), RepositoryError> {
        self.lock().events.push(event);
        Ok(())
    }

    fn events_for(&self, kind: &str, id: &str) -> Result<Vec<Event>, RepositoryError> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|event| event.auditable_kind == kind && event.auditable_id == id)
            .cloned()
            .collect())
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert_application(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut state = self.lock();
        let owner_has_active = application.status.is_active()
            && state.applications.values().any(|existing| {
                existing.user_id == application.user_id && existing.status.is_active()
            });
        if owner_has_active || state.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update_application(
        &self,
        current: &Application,
        updated: Application,
    ) -> Result<(), RepositoryError> {
        replace(&mut self.lock().applications, &current.id, current, updated)
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock().applications.get(id).cloned())
    }

    fn applications_for_user(&self, user_id: &UserId) -> Result<Vec<Application>, RepositoryError> {
        let applications = self
            .lock()
            .applications
            .values()
            .filter(|application| &application.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted(applications, |application: &Application| {
            (application.created_at, application.id.clone())
        }))
    }

    fn applications_with_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<Application>, RepositoryError> {
        let applications = self
            .lock()
            .applications
            .values()
            .filter(|application| application.status == status)
            .cloned()
            .collect();
        Ok(sorted(applications, |application: &Application| {
            (application.created_at, application.id.clone())
        }))
    }
}

impl ProofRepository for MemoryStore {
    fn record_submission(
        &self,
        write: SubmissionWrite,
        limiter: &ProofRateLimiter,
    ) -> Result<(), SubmissionWriteError> {
        let mut state = self.lock();
        let recent: Vec<ProofSubmissionAudit> = state
            .submission_audits
            .iter()
            .filter(|audit| audit.user_id == write.audit.user_id)
            .cloned()
            .collect();
        limiter.check(write.audit.channel, &recent, write.audit.submitted_at)?;
        replace(
            &mut state.applications,
            &write.current.id,
            &write.current,
            write.updated,
        )?;
        state.submissions.push(write.submission);
        state.submission_audits.push(write.audit);
        Ok(())
    }

    fn audits_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProofSubmissionAudit>, RepositoryError> {
        Ok(self
            .lock()
            .submission_audits
            .iter()
            .filter(|audit| &audit.user_id == user_id && audit.submitted_at >= since)
            .cloned()
            .collect())
    }

    fn submissions_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ProofSubmission>, RepositoryError> {
        Ok(self
            .lock()
            .submissions
            .iter()
            .filter(|submission| &submission.application_id == application_id)
            .cloned()
            .collect())
    }

    fn record_review(
        &self,
        current: &Application,
        updated: Application,
        review: ProofReview,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        replace(&mut state.applications, &current.id, current, updated)?;
        state.reviews.push(review);
        Ok(())
    }

    fn reviews_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ProofReview>, RepositoryError> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .filter(|review| &review.application_id == application_id)
            .cloned()
            .collect())
    }
}

impl DocumentStore for MemoryStore {
    fn put_document(&self, key: &str, bytes: Vec<u8>) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.documents.contains_key(key) {
            return Err(RepositoryError::Conflict);
        }
        state.documents.insert(key.to_string(), bytes);
        Ok(())
    }

    fn get_document(&self, key: &str) -> Result<Option<Vec<u8>>, RepositoryError> {
        Ok(self.lock().documents.get(key).cloned())
    }

    fn delete_document(&self, key: &str) -> Result<(), RepositoryError> {
        self.lock().documents.remove(key);
        Ok(())
    }
}

impl EvaluationRepository for MemoryStore {
    fn insert_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError> {
        let mut state = self.lock();
        if state.evaluations.contains_key(&evaluation.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .evaluations
            .insert(evaluation.id.clone(), evaluation.clone());
        Ok(evaluation)
    }

    fn update_evaluation(
        &self,
        current: &Evaluation,
        updated: Evaluation,
    ) -> Result<(), RepositoryError> {
        replace(&mut self.lock().evaluations, &current.id, current, updated)
    }

    fn fetch_evaluation(&self, id: &EvaluationId) -> Result<Option<Evaluation>, RepositoryError> {
        Ok(self.lock().evaluations.get(id).cloned())
    }

    fn evaluations_for_evaluator(
        &self,
        evaluator_id: &UserId,
    ) -> Result<Vec<Evaluation>, RepositoryError> {
        Ok(self
            .lock()
            .evaluations
            .values()
            .filter(|evaluation| &evaluation.evaluator_id == evaluator_id)
            .cloned()
            .collect())
    }

    fn evaluations_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Evaluation>, RepositoryError> {
        let evaluations = self
            .lock()
            .evaluations
            .values()
            .filter(|evaluation| &evaluation.application_id == application_id)
            .cloned()
            .collect();
        Ok(sorted(evaluations, |evaluation: &Evaluation| {
            evaluation.created_at
        }))
    }
}

impl VoucherRepository for MemoryStore {
    fn insert_voucher(&self, voucher: Voucher) -> Result<Voucher, RepositoryError> {
        let mut state = self.lock();
        if state.vouchers.contains_key(&voucher.code) {
            return Err(RepositoryError::Conflict);
        }
        state.vouchers.insert(voucher.code.clone(), voucher.clone());
        Ok(voucher)
    }

    fn update_voucher(&self, current: &Voucher, updated: Voucher) -> Result<(), RepositoryError> {
        replace(&mut self.lock().vouchers, &current.code, current, updated)
    }

    fn fetch_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>, RepositoryError> {
        Ok(self.lock().vouchers.get(code).cloned())
    }

    fn vouchers_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Voucher>, RepositoryError> {
        let vouchers = self
            .lock()
            .vouchers
            .values()
            .filter(|voucher| &voucher.application_id == application_id)
            .cloned()
            .collect();
        Ok(sorted(vouchers, |voucher: &Voucher| voucher.issued_at))
    }

    fn active_vouchers_expiring_by(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Voucher>, RepositoryError> {
        let vouchers = self
            .lock()
            .vouchers
            .values()
            .filter(|voucher| voucher.status == VoucherStatus::Active && voucher.expires_at <= cutoff)
            .cloned()
            .collect();
        Ok(sorted(vouchers, |voucher: &Voucher| {
            (voucher.expires_at, voucher.code.clone())
        }))
    }

    fn record_redemption(
        &self,
        voucher: Voucher,
        expected_remaining_cents: u64,
        transaction: VoucherTransaction,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let current = state
            .vouchers
            .get(&voucher.code)
            .ok_or(RepositoryError::NotFound)?;
        if current.status != VoucherStatus::Active
            || current.remaining_value_cents != expected_remaining_cents
            || state.transactions.contains_key(&transaction.id)
        {
            return Err(RepositoryError::Conflict);
        }
        state.vouchers.insert(voucher.code.clone(), voucher);
        state.transactions.insert(transaction.id.clone(), transaction);
        Ok(())
    }

    fn transactions_for_voucher(
        &self,
        code: &VoucherCode,
    ) -> Result<Vec<VoucherTransaction>, RepositoryError> {
        let transactions = self
            .lock()
            .transactions
            .values()
            .filter(|transaction| &transaction.voucher_code == code)
            .cloned()
            .collect();
        Ok(sorted(transactions, |transaction: &VoucherTransaction| {
            (transaction.processed_at, transaction.id.clone())
        }))
    }
}

impl InvoiceRepository for MemoryStore {
    fn create_invoice(&self, draft: InvoiceDraft) -> Result<Option<Invoice>, RepositoryError> {
        let mut state = self.lock();
        if state.invoices.contains_key(&draft.id) {
            return Err(RepositoryError::Conflict);
        }

        let mut claimed: Vec<&mut VoucherTransaction> = state
            .transactions
            .values_mut()
            .filter(|transaction| {
                transaction.vendor_id == draft.vendor_id
                    && transaction.invoice_id.is_none()
                    && draft.period.contains(transaction.processed_at)
            })
            .collect();
        if claimed.is_empty() {
            return Ok(None);
        }
        claimed.sort_by(|left, right| {
            (left.processed_at, &left.id).cmp(&(right.processed_at, &right.id))
        });

        let mut total_cents = 0;
        let mut transaction_ids = Vec::with_capacity(claimed.len());
        for transaction in claimed {
            transaction.invoice_id = Some(draft.id.clone());
            total_cents += transaction.amount_cents;
            transaction_ids.push(transaction.id.clone());
        }

        let counter = state
            .invoice_numbers
            .entry(draft.number_prefix.clone())
            .or_insert(0);
        *counter += 1;
        let number = format!("{}-{:04}", draft.number_prefix, counter);

        let invoice = Invoice {
            id: draft.id,
            number,
            vendor_id: draft.vendor_id,
            period_start: draft.period.start,
            period_end: draft.period.end,
            total_cents,
            transaction_ids,
            status: InvoiceStatus::Pending,
            check_number: None,
            paid_at: None,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        state.invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(Some(invoice))
    }

    fn update_invoice(&self, current: &Invoice, updated: Invoice) -> Result<(), RepositoryError> {
        replace(&mut self.lock().invoices, &current.id, current, updated)
    }

    fn fetch_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        Ok(self.lock().invoices.get(id).cloned())
    }

    fn invoices_for_vendor(&self, vendor_id: &UserId) -> Result<Vec<Invoice>, RepositoryError> {
        let invoices = self
            .lock()
            .invoices
            .values()
            .filter(|invoice| &invoice.vendor_id == vendor_id)
            .cloned()
            .collect();
        Ok(sorted(invoices, |invoice: &Invoice| {
            (invoice.created_at, invoice.number.clone())
        }))
    }

    fn release_invoice(&self, current: &Invoice, cancelled: Invoice) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        replace(&mut state.invoices, &current.id, current, cancelled)?;
        for transaction in state.transactions.values_mut() {
            if transaction.invoice_id.as_ref() == Some(&current.id) {
                transaction.invoice_id = None;
            }
        }
        Ok(())
    }

    fn transactions_for_invoice(
        &self,
        id: &InvoiceId,
    ) -> Result<Vec<VoucherTransaction>, RepositoryError> {
        let state = self.lock();
        let Some(invoice) = state.invoices.get(id) else {
            return Err(RepositoryError::NotFound);
        };
        Ok(invoice
            .transaction_ids
            .iter()
            .filter_map(|transaction_id| state.transactions.get(transaction_id))
            .cloned()
            .collect())
    }
}

impl NotificationRepository for MemoryStore {
    fn insert_notification(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.notifications.contains_key(&notification.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .notifications
            .insert(notification.id.clone(), notification);
        Ok(())
    }

    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        match state.notifications.get_mut(&notification.id) {
            Some(existing) => {
                *existing = notification;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(self.lock().notifications.get(id).cloned())
    }

    fn find_notification_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(self
            .lock()
            .notifications
            .values()
            .find(|notification| notification.message_id.as_deref() == Some(message_id))
            .cloned())
    }

    fn notifications_for(&self, recipient: &UserId) -> Result<Vec<Notification>, RepositoryError> {
        let notifications = self
            .lock()
            .notifications
            .values()
            .filter(|notification| &notification.recipient_id == recipient)
            .cloned()
            .collect();
        Ok(sorted(notifications, |notification: &Notification| {
            (notification.created_at, notification.id.0.clone())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::invoices::BillingPeriod;
    use crate::workflows::testing::{constituent, vendor_user};
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, 12, 0, 0).single().expect("valid time")
    }

    fn transaction(id: &str, vendor: &str, processed_at: DateTime<Utc>) -> VoucherTransaction {
        VoucherTransaction {
            id: TransactionId(id.to_string()),
            voucher_code: VoucherCode("ABCDEFGH2345".to_string()),
            vendor_id: UserId(vendor.to_string()),
            amount_cents: 10_000,
            products: Vec::new(),
            reference_number: format!("REF-{id}"),
            processed_at,
            invoice_id: None,
        }
    }

    #[test]
    fn user_emails_are_unique_ignoring_case() {
        let store = MemoryStore::default();
        let mut first = constituent("usr-a");
        first.email = "Casey@Example.org".to_string();
        store.insert_user(first).expect("insert");

        let mut duplicate = constituent("usr-b");
        duplicate.email = "casey@example.org".to_string();
        assert!(matches!(
            store.insert_user(duplicate),
            Err(RepositoryError::Conflict)
        ));
        assert!(store
            .find_user_by_email(" CASEY@example.ORG ")
            .expect("lookup")
            .is_some());
    }

    #[test]
    fn invoice_claims_only_matching_uninvoiced_transactions() {
        let store = MemoryStore::default();
        store.insert_user(vendor_user("usr-shop", true)).expect("insert");
        {
            let mut state = store.lock();
            for row in [
                transaction("txn-1", "usr-shop", at(2)),
                transaction("txn-2", "usr-shop", at(20)),
                transaction("txn-3", "usr-other", at(3)),
                transaction("txn-4", "usr-shop", at(30) + Duration::days(2)),
            ] {
                state.transactions.insert(row.id.clone(), row);
            }
        }
        let period = BillingPeriod::new(at(1), at(30) + Duration::hours(12)).expect("period");
        let draft = InvoiceDraft {
            id: InvoiceId("inv-1".to_string()),
            vendor_id: UserId("usr-shop".to_string()),
            period,
            number_prefix: "INV-202505".to_string(),
            created_at: at(30),
        };

        let invoice = store.create_invoice(draft).expect("create").expect("claimed");
        assert_eq!(
            invoice.transaction_ids,
            vec![
                TransactionId("txn-1".to_string()),
                TransactionId("txn-2".to_string())
            ]
        );
        assert_eq!(invoice.total_cents, 20_000);

        let mut cancelled = invoice.clone();
        cancelled.status = InvoiceStatus::Cancelled;
        store.release_invoice(&invoice, cancelled).expect("release");
        let state = store.lock();
        assert!(state
            .transactions
            .values()
            .all(|transaction| transaction.invoice_id.is_none()));
    }

    #[test]
    fn stale_redemption_is_a_conflict() {
        let store = MemoryStore::default();
        let now = at(5);
        let voucher = Voucher {
            code: VoucherCode("ABCDEFGH2345".to_string()),
            application_id: ApplicationId("app-000001".to_string()),
            constituent_id: UserId("usr-c".to_string()),
            initial_value_cents: 50_000,
            remaining_value_cents: 50_000,
            status: VoucherStatus::Active,
            issued_at: now,
            expires_at: now + Duration::days(180),
            last_used_at: None,
            expiry_warning_sent: false,
        };
        store.insert_voucher(voucher.clone()).expect("insert");

        let mut debited = voucher.clone();
        debited.remaining_value_cents = 40_000;
        store
            .record_redemption(debited.clone(), 50_000, transaction("txn-a", "usr-v", now))
            .expect("first redemption");
        assert!(matches!(
            store.record_redemption(debited, 50_000, transaction("txn-b", "usr-v", now)),
            Err(RepositoryError::Conflict)
        ));
        assert_eq!(
            store
                .transactions_for_voucher(&voucher.code)
                .expect("list")
                .len(),
            1
        );
    }
}
