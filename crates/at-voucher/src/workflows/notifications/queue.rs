use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::channels::{DeliveryChannel, DeliveryError};
use super::domain::{DeliveryMethod, DeliveryStatus, Notification, NotificationId};
use super::repository::NotificationRepository;
use super::templates::render;
use crate::config::NotificationConfig;
use crate::workflows::accounts::UserRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryJob {
    pub notification_id: NotificationId,
    pub attempt: u32,
}

/// Producer half of the delivery queue.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<DeliveryJob>,
}

impl NotificationQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeliveryJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, job: DeliveryJob) -> Result<(), mpsc::error::SendError<DeliveryJob>> {
        self.sender.send(job)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    RetryScheduled(Duration),
    Failed(String),
    Skipped,
}

/// Consumes delivery jobs and hands rendered messages to the matching channel.
pub struct DeliveryWorker {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
    channels: HashMap<DeliveryMethod, Arc<dyn DeliveryChannel>>,
    queue: NotificationQueue,
    config: NotificationConfig,
}

impl DeliveryWorker {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserRepository>,
        channels: Vec<Arc<dyn DeliveryChannel>>,
        queue: NotificationQueue,
        config: NotificationConfig,
    ) -> Self {
        let channels = channels
            .into_iter()
            .map(|channel| (channel.method(), channel))
            .collect();
        Self {
            notifications,
            users,
            channels,
            queue,
            config,
        }
    }

    /// Drain the queue until every producer is dropped.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<DeliveryJob>) {
        info!("notification delivery worker started");
        while let Some(job) = receiver.recv().await {
            if let DeliveryOutcome::RetryScheduled(delay) = self.deliver(&job, Utc::now()) {
                let queue = self.queue.clone();
                let retry = DeliveryJob {
                    notification_id: job.notification_id.clone(),
                    attempt: job.attempt + 1,
                };
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if queue.enqueue(retry).is_err() {
                        warn!("delivery queue closed before retry");
                    }
                });
            }
        }
        info!("notification delivery worker stopped");
    }

    /// Attempt a single delivery and persist the result.
    pub fn deliver(&self, job: &DeliveryJob, now: DateTime<Utc>) -> DeliveryOutcome {
        let mut notification = match self.notifications.fetch_notification(&job.notification_id) {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                warn!(id = %job.notification_id.0, "delivery job for unknown notification");
                return DeliveryOutcome::Skipped;
            }
            Err(err) => return self.retry_or_fail(None, job, err.to_string(), now),
        };

        if notification.delivery_status != DeliveryStatus::Queued {
            return DeliveryOutcome::Skipped;
        }

        let recipient = match self.users.fetch_user(&notification.recipient_id) {
            Ok(Some(user)) => user,
            Ok(None) => {
                return self.fail(&mut notification, job, "recipient no longer exists", now)
            }
            Err(err) => return self.retry_or_fail(Some(notification), job, err.to_string(), now),
        };

        let Some(channel) = self.channels.get(&notification.delivery_method) else {
            return self.fail(&mut notification, job, "no channel configured", now);
        };

        let message = render(&notification.action, &recipient);
        match channel.deliver(&recipient, &message) {
            Ok(receipt) => {
                notification.delivery_status = DeliveryStatus::Sent;
                notification.message_id = receipt.message_id;
                notification.attempts = job.attempt;
                notification.last_error = None;
                notification.updated_at = now;
                self.persist(&notification);
                info!(
                    id = %notification.id.0,
                    action = notification.action.label(),
                    method = ?notification.delivery_method,
                    "notification sent"
                );
                DeliveryOutcome::Sent
            }
            Err(DeliveryError::Transient(reason)) => {
                self.retry_or_fail(Some(notification), job, reason, now)
            }
            Err(DeliveryError::Permanent(reason)) => {
                self.fail(&mut notification, job, &reason, now)
            }
        }
    }

    fn retry_or_fail(
        &self,
        notification: Option<Notification>,
        job: &DeliveryJob,
        reason: String,
        now: DateTime<Utc>,
    ) -> DeliveryOutcome {
        if job.attempt < self.config.max_attempts {
            if let Some(mut notification) = notification {
                notification.attempts = job.attempt;
                notification.last_error = Some(reason.clone());
                notification.updated_at = now;
                self.persist(&notification);
            }
            let delay = self.backoff(job.attempt);
            warn!(id = %job.notification_id.0, attempt = job.attempt, %reason, ?delay, "delivery failed, retrying");
            return DeliveryOutcome::RetryScheduled(delay);
        }

        match notification {
            Some(mut notification) => self.fail(&mut notification, job, &reason, now),
            None => {
                error!(id = %job.notification_id.0, %reason, "delivery abandoned");
                DeliveryOutcome::Failed(reason)
            }
        }
    }

    fn fail(
        &self,
        notification: &mut Notification,
        job: &DeliveryJob,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DeliveryOutcome {
        notification.delivery_status = DeliveryStatus::Failed;
        notification.attempts = job.attempt;
        notification.last_error = Some(reason.to_string());
        notification.updated_at = now;
        self.persist(notification);
        error!(id = %notification.id.0, %reason, "notification delivery failed");
        DeliveryOutcome::Failed(reason.to_string())
    }

    fn persist(&self, notification: &Notification) {
        if let Err(err) = self.notifications.update_notification(notification.clone()) {
            error!(id = %notification.id.0, error = %err, "failed to persist delivery result");
        }
    }

    /// Exponential backoff: base, 2x base, 4x base, ...
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.config.retry_base_millis.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflows::accounts::{User, UserId};
    use crate::workflows::notifications::channels::{DeliveryReceipt, EmailOutbox, FaxOutbox};
    use crate::workflows::notifications::service::NotificationService;
    use crate::workflows::notifications::templates::RenderedMessage;
    use crate::workflows::notifications::NotificationAction;
    use crate::workflows::testing::constituent;
    use std::sync::Mutex;

    struct FlakyChannel {
        failures_left: Mutex<u32>,
    }

    impl DeliveryChannel for FlakyChannel {
        fn method(&self) -> DeliveryMethod {
            DeliveryMethod::Email
        }

        fn deliver(
            &self,
            _recipient: &User,
            _message: &RenderedMessage,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            let mut left = self.failures_left.lock().expect("mutex");
            if *left > 0 {
                *left -= 1;
                return Err(DeliveryError::Transient("provider timeout".to_string()));
            }
            Ok(DeliveryReceipt {
                message_id: Some("pm-flaky".to_string()),
            })
        }
    }

    fn setup(
        channels: Vec<Arc<dyn DeliveryChannel>>,
    ) -> (Arc<MemoryStore>, NotificationService, DeliveryWorker, NotificationId) {
        let store = Arc::new(MemoryStore::default());
        store.insert_user(constituent("usr-q1")).expect("insert");
        let (queue, _receiver) = NotificationQueue::channel();
        let service = NotificationService::new(store.clone(), store.clone(), queue.clone());
        let worker = DeliveryWorker::new(
            store.clone(),
            store.clone(),
            channels,
            queue,
            NotificationConfig {
                max_attempts: 3,
                retry_base_millis: 100,
            },
        );
        let notification = service
            .notify(
                &UserId("usr-q1".to_string()),
                None,
                NotificationAction::VoucherExpired {
                    code: "ABCDEFGH2345".to_string(),
                },
                Utc::now(),
            )
            .expect("queued");
        (store, service, worker, notification.id)
    }

    #[test]
    fn successful_delivery_marks_sent_with_message_id() {
        let email = Arc::new(EmailOutbox::default());
        let (store, _service, worker, id) = setup(vec![email.clone() as Arc<dyn DeliveryChannel>]);

        let outcome = worker.deliver(
            &DeliveryJob {
                notification_id: id.clone(),
                attempt: 1,
            },
            Utc::now(),
        );

        assert_eq!(outcome, DeliveryOutcome::Sent);
        let stored = store.fetch_notification(&id).expect("fetch").expect("present");
        assert_eq!(stored.delivery_status, DeliveryStatus::Sent);
        assert_eq!(stored.attempts, 1);
        let sent = email.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(stored.message_id.as_deref(), Some(sent[0].message_id.as_str()));
    }

    #[test]
    fn transient_failures_back_off_then_fail() {
        let flaky = Arc::new(FlakyChannel {
            failures_left: Mutex::new(10),
        });
        let (store, _service, worker, id) = setup(vec![flaky as Arc<dyn DeliveryChannel>]);

        let first = worker.deliver(
            &DeliveryJob {
                notification_id: id.clone(),
                attempt: 1,
            },
            Utc::now(),
        );
        assert_eq!(first, DeliveryOutcome::RetryScheduled(Duration::from_millis(100)));

        let second = worker.deliver(
            &DeliveryJob {
                notification_id: id.clone(),
                attempt: 2,
            },
            Utc::now(),
        );
        assert_eq!(second, DeliveryOutcome::RetryScheduled(Duration::from_millis(200)));

        let last = worker.deliver(
            &DeliveryJob {
                notification_id: id.clone(),
                attempt: 3,
            },
            Utc::now(),
        );
        assert!(matches!(last, DeliveryOutcome::Failed(_)));
        let stored = store.fetch_notification(&id).expect("fetch").expect("present");
        assert_eq!(stored.delivery_status, DeliveryStatus::Failed);
        assert_eq!(stored.attempts, 3);
    }

    #[test]
    fn missing_channel_fails_permanently() {
        let (store, _service, worker, id) = setup(vec![Arc::new(FaxOutbox::default()) as Arc<dyn DeliveryChannel>]);
        let outcome = worker.deliver(
            &DeliveryJob {
                notification_id: id.clone(),
                attempt: 1,
            },
            Utc::now(),
        );
        assert!(matches!(outcome, DeliveryOutcome::Failed(_)));
        let stored = store.fetch_notification(&id).expect("fetch").expect("present");
        assert_eq!(stored.delivery_status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn worker_retries_until_delivered() {
        let flaky = Arc::new(FlakyChannel {
            failures_left: Mutex::new(1),
        });
        let store = Arc::new(MemoryStore::default());
        store.insert_user(constituent("usr-q2")).expect("insert");
        let (queue, receiver) = NotificationQueue::channel();
        let service = NotificationService::new(store.clone(), store.clone(), queue.clone());
        let worker = DeliveryWorker::new(
            store.clone(),
            store.clone(),
            vec![flaky as Arc<dyn DeliveryChannel>],
            queue,
            NotificationConfig {
                max_attempts: 3,
                retry_base_millis: 5,
            },
        );
        let notification = service
            .notify(
                &UserId("usr-q2".to_string()),
                None,
                NotificationAction::VoucherExpired {
                    code: "ABCDEFGH2345".to_string(),
                },
                Utc::now(),
            )
            .expect("queued");

        let handle = tokio::spawn(worker.run(receiver));
        let mut delivered = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let stored = store
                .fetch_notification(&notification.id)
                .expect("fetch")
                .expect("present");
            if stored.delivery_status == DeliveryStatus::Sent {
                assert_eq!(stored.attempts, 2);
                assert_eq!(stored.message_id.as_deref(), Some("pm-flaky"));
                delivered = true;
                break;
            }
        }
        handle.abort();
        assert!(delivered, "notification should be delivered after one retry");
    }
}
