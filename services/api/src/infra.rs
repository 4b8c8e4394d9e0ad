use at_voucher::config::{AccountsConfig, AppConfig};
use at_voucher::error::AppError;
use at_voucher::store::MemoryStore;
use at_voucher::workflows::notifications::{
    DeliveryChannel, DeliveryJob, DeliveryWorker, EmailOutbox, FaxOutbox, NotificationQueue,
    PrintQueue,
};
use at_voucher::workflows::Services;
use metrics_exporter_prometheus::PrometheusHandle;
use chrono::Utc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// The in-process backend: one store, the workflow services, and the delivery transports.
pub(crate) struct Backend {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) services: Arc<Services>,
    pub(crate) email: EmailOutbox,
    pub(crate) fax: FaxOutbox,
    pub(crate) letters: PrintQueue,
    queue: NotificationQueue,
    receiver: UnboundedReceiver<DeliveryJob>,
}

impl Backend {
    pub(crate) fn new(config: &AppConfig) -> Result<Self, AppError> {
        let store = Arc::new(MemoryStore::default());
        let (queue, receiver) = NotificationQueue::channel();
        let services = Arc::new(Services::new(
            store.clone(),
            &config.program,
            &config.inbound.webhook_secret,
            queue.clone(),
        ));
        seed_accounts(&services, &config.accounts)?;
        Ok(Self {
            store,
            services,
            email: EmailOutbox::default(),
            fax: FaxOutbox::default(),
            letters: PrintQueue::default(),
            queue,
            receiver,
        })
    }

    /// Hand the queue's consumer half to a delivery worker running on its own task.
    pub(crate) fn spawn_delivery_worker(self, config: &AppConfig) -> Arc<Services> {
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(self.email.clone()) as Arc<dyn DeliveryChannel>,
            Arc::new(self.fax.clone()) as Arc<dyn DeliveryChannel>,
            Arc::new(self.letters.clone()) as Arc<dyn DeliveryChannel>,
        ];
        let worker = DeliveryWorker::new(
            self.store.clone(),
            self.store.clone(),
            channels,
            self.queue,
            config.notifications,
        );
        tokio::spawn(worker.run(self.receiver));
        self.services
    }
}

/// Open the configured bootstrap administrator so a fresh store can provision everyone else.
pub(crate) fn seed_accounts(services: &Services, config: &AccountsConfig) -> Result<(), AppError> {
    if let Some(email) = config.bootstrap_admin_email.as_deref() {
        let admin = services.accounts.bootstrap_administrator(email, Utc::now())?;
        info!(user = %admin.id, "bootstrap administrator available");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_voucher::config::ProgramConfig;
    use at_voucher::workflows::accounts::{UserRepository, UserRole};

    #[test]
    fn bootstrap_administrator_is_seeded_once() {
        let store = Arc::new(MemoryStore::default());
        let (queue, _receiver) = NotificationQueue::channel();
        let services = Services::new(store.clone(), &ProgramConfig::default(), "secret", queue);
        let config = AccountsConfig {
            bootstrap_admin_email: Some("director@vouchers.example".to_string()),
        };

        seed_accounts(&services, &config).expect("seeded");
        seed_accounts(&services, &config).expect("seeded again");

        let admins = store
            .users_with_role(UserRole::Administrator)
            .expect("administrators");
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "director@vouchers.example");
    }

    #[test]
    fn invalid_bootstrap_address_fails_startup() {
        let (queue, _receiver) = NotificationQueue::channel();
        let services = Services::new(
            Arc::new(MemoryStore::default()),
            &ProgramConfig::default(),
            "secret",
            queue,
        );
        let config = AccountsConfig {
            bootstrap_admin_email: Some("director".to_string()),
        };
        assert!(matches!(
            seed_accounts(&services, &config),
            Err(AppError::Accounts(_))
        ));
    }
}
