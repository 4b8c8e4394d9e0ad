use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use super::accounts::{
    self, AccountService, CredentialStore, PasswordResetService, ResetTokenRepository,
    UserRepository,
};
use super::applications::{self, ApplicationRepository, ApplicationService, IncomeThreshold};
use super::audit::EventLog;
use super::evaluations::{self, EvaluationRepository, EvaluationService};
use super::inbound::{self, MailboxRouter, WebhookVerifier};
use super::invoices::{self, BillingPeriod, Invoice, InvoiceError, InvoiceRepository, InvoiceService};
use super::notifications::{self, NotificationQueue, NotificationRepository, NotificationService};
use super::proofs::{self, DocumentStore, ProofRateLimiter, ProofRepository, ProofService};
use super::vouchers::{
    self, SweepReport, VoucherError, VoucherPolicy, VoucherRepository, VoucherService,
};
use crate::config::ProgramConfig;

/// Everything a backing store must provide.
pub trait Storage:
    UserRepository
    + CredentialStore
    + ResetTokenRepository
    + EventLog
    + ApplicationRepository
    + ProofRepository
    + DocumentStore
    + EvaluationRepository
    + VoucherRepository
    + InvoiceRepository
    + NotificationRepository
    + 'static
{
}

impl<T> Storage for T where
    T: UserRepository
        + CredentialStore
        + ResetTokenRepository
        + EventLog
        + ApplicationRepository
        + ProofRepository
        + DocumentStore
        + EvaluationRepository
        + VoucherRepository
        + InvoiceRepository
        + NotificationRepository
        + 'static
{
}

/// The workflow services, wired to one store; shared as router state.
pub struct Services {
    pub users: Arc<dyn UserRepository>,
    pub events: Arc<dyn EventLog>,
    pub notifications: Arc<NotificationService>,
    pub applications: Arc<ApplicationService>,
    pub proofs: Arc<ProofService>,
    pub evaluations: Arc<EvaluationService>,
    pub vouchers: Arc<VoucherService>,
    pub invoices: Arc<InvoiceService>,
    pub password_resets: Arc<PasswordResetService>,
    pub accounts: Arc<AccountService>,
    pub mailbox: Arc<MailboxRouter>,
    pub webhooks: WebhookVerifier,
}

impl Services {
    pub fn new<S: Storage>(
        store: Arc<S>,
        program: &ProgramConfig,
        webhook_secret: &str,
        queue: NotificationQueue,
    ) -> Self {
        let users: Arc<dyn UserRepository> = store.clone();
        let events: Arc<dyn EventLog> = store.clone();
        let documents: Arc<dyn DocumentStore> = store.clone();

        let notifications = Arc::new(NotificationService::new(
            store.clone(),
            users.clone(),
            queue,
        ));
        let vouchers = Arc::new(VoucherService::new(
            store.clone(),
            users.clone(),
            events.clone(),
            notifications.clone(),
            VoucherPolicy::from_config(program),
        ));
        let evaluations = Arc::new(EvaluationService::new(
            store.clone(),
            events.clone(),
            notifications.clone(),
        ));
        let applications = Arc::new(ApplicationService::new(
            store.clone(),
            users.clone(),
            events.clone(),
            notifications.clone(),
            vouchers.clone(),
            evaluations.clone(),
            IncomeThreshold::from_config(program),
        ));
        let proofs = Arc::new(ProofService::new(
            store.clone(),
            store.clone(),
            documents.clone(),
            events.clone(),
            notifications.clone(),
            ProofRateLimiter::from_config(program),
            program.max_proof_rejections,
        ));
        let invoices = Arc::new(InvoiceService::new(
            store.clone(),
            users.clone(),
            events.clone(),
            notifications.clone(),
        ));
        let password_resets = Arc::new(PasswordResetService::new(
            users.clone(),
            store.clone(),
            store.clone(),
            events.clone(),
            notifications.clone(),
            Duration::minutes(program.password_reset_ttl_minutes),
        ));
        let accounts = Arc::new(AccountService::new(users.clone(), events.clone()));
        let mailbox = Arc::new(MailboxRouter::new(
            users.clone(),
            applications.clone(),
            proofs.clone(),
            documents,
            events.clone(),
            notifications.clone(),
        ));

        Self {
            users,
            events,
            notifications,
            applications,
            proofs,
            evaluations,
            vouchers,
            invoices,
            password_resets,
            accounts,
            mailbox,
            webhooks: WebhookVerifier::new(webhook_secret),
        }
    }

    /// The periodic jobs: the voucher expiration sweep, plus invoicing when a period is given.
    pub fn run_scheduled(
        &self,
        now: DateTime<Utc>,
        invoice_period: Option<BillingPeriod>,
    ) -> Result<ScheduledRun, ScheduledError> {
        let vouchers = self.vouchers.expire_due(now)?;
        let invoices = match invoice_period {
            Some(period) => self.invoices.generate_all(None, period, now)?,
            None => Vec::new(),
        };
        info!(
            expired = vouchers.expired.len(),
            warned = vouchers.warned.len(),
            invoices = invoices.len(),
            "scheduled jobs finished"
        );
        Ok(ScheduledRun { vouchers, invoices })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduledRun {
    pub vouchers: SweepReport,
    pub invoices: Vec<Invoice>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduledError {
    #[error("voucher sweep failed: {0}")]
    Vouchers(#[from] VoucherError),
    #[error("invoice generation failed: {0}")]
    Invoices(#[from] InvoiceError),
}

/// Every workflow route, sharing one [`Services`] state.
pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .merge(accounts::router::routes())
        .merge(applications::router::routes())
        .merge(proofs::router::routes())
        .merge(evaluations::router::routes())
        .merge(vouchers::router::routes())
        .merge(invoices::router::routes())
        .merge(notifications::router::routes())
        .merge(inbound::router::routes(services.webhooks.clone()))
        .with_state(services)
}
