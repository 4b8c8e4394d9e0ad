use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::domain::{
    DeliveryMethod, DeliveryStatus, Notification, NotificationAction, NotificationId,
};
use super::queue::{DeliveryJob, NotificationQueue};
use super::repository::NotificationRepository;
use crate::store::RepositoryError;
use crate::workflows::accounts::{User, UserId, UserRepository};
use crate::workflows::sequence::Sequence;

static NOTIFICATION_SEQUENCE: Sequence = Sequence::new("ntf");

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("unknown recipient {0}")]
    UnknownRecipient(UserId),
    #[error("delivery queue is closed")]
    QueueClosed,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Persists notifications and hands them to the delivery worker.
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
    queue: NotificationQueue,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserRepository>,
        queue: NotificationQueue,
    ) -> Self {
        Self {
            notifications,
            users,
            queue,
        }
    }

    pub fn notify(
        &self,
        recipient_id: &UserId,
        actor_id: Option<&UserId>,
        action: NotificationAction,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotificationError> {
        let recipient = self
            .users
            .fetch_user(recipient_id)?
            .ok_or_else(|| NotificationError::UnknownRecipient(recipient_id.clone()))?;

        let notification = Notification {
            id: NotificationId(NOTIFICATION_SEQUENCE.next_id()),
            recipient_id: recipient.id.clone(),
            actor_id: actor_id.cloned(),
            action,
            delivery_method: delivery_method_for(&recipient),
            delivery_status: DeliveryStatus::Queued,
            message_id: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        self.notifications.insert_notification(notification.clone())?;
        self.queue
            .enqueue(DeliveryJob {
                notification_id: notification.id.clone(),
                attempt: 1,
            })
            .map_err(|_| NotificationError::QueueClosed)?;

        debug!(
            id = %notification.id.0,
            action = notification.action.label(),
            method = ?notification.delivery_method,
            "notification queued"
        );
        Ok(notification)
    }

    /// Fire-and-forget variant used inside business operations, which must not fail on a
    /// notification problem.
    pub(crate) fn dispatch(
        &self,
        recipient_id: &UserId,
        actor_id: Option<&UserId>,
        action: NotificationAction,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let label = action.label();
        match self.notify(recipient_id, actor_id, action, now) {
            Ok(notification) => Some(notification),
            Err(err) => {
                warn!(recipient = %recipient_id, action = label, error = %err, "notification not queued");
                None
            }
        }
    }

    /// Apply a provider callback. Unknown message ids yield `Ok(None)`.
    pub fn record_delivery_status(
        &self,
        message_id: &str,
        status: DeliveryStatus,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, NotificationError> {
        let Some(mut notification) = self.notifications.find_notification_by_message_id(message_id)?
        else {
            return Ok(None);
        };

        if !notification.delivery_status.can_transition_to(status) {
            debug!(
                message_id,
                current = notification.delivery_status.label(),
                incoming = status.label(),
                "ignoring stale delivery status"
            );
            return Ok(Some(notification));
        }

        notification.delivery_status = status;
        if detail.is_some() {
            notification.last_error = detail;
        }
        notification.updated_at = now;
        self.notifications.update_notification(notification.clone())?;
        Ok(Some(notification))
    }

    pub fn for_recipient(&self, recipient_id: &UserId) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.notifications.notifications_for(recipient_id)?)
    }
}

/// Preferred method, falling back to email when the contact detail it needs is missing.
fn delivery_method_for(recipient: &User) -> DeliveryMethod {
    match DeliveryMethod::from(recipient.communication_preference) {
        DeliveryMethod::Fax if recipient.fax.as_deref().map_or(true, str::is_empty) => {
            DeliveryMethod::Email
        }
        DeliveryMethod::Letter if recipient.address.is_none() => DeliveryMethod::Email,
        method => method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflows::accounts::CommunicationPreference;
    use crate::workflows::testing::constituent;

    fn service(store: &Arc<MemoryStore>) -> (NotificationService, tokio::sync::mpsc::UnboundedReceiver<DeliveryJob>) {
        let (queue, receiver) = NotificationQueue::channel();
        (
            NotificationService::new(store.clone(), store.clone(), queue),
            receiver,
        )
    }

    #[test]
    fn notify_persists_and_enqueues() {
        let store = Arc::new(MemoryStore::default());
        store.insert_user(constituent("usr-n1")).expect("insert");
        let (service, mut receiver) = service(&store);

        let notification = service
            .notify(
                &UserId("usr-n1".to_string()),
                None,
                NotificationAction::VoucherExpired {
                    code: "ABCDEFGH2345".to_string(),
                },
                Utc::now(),
            )
            .expect("notification queued");

        assert_eq!(notification.delivery_status, DeliveryStatus::Queued);
        assert_eq!(notification.delivery_method, DeliveryMethod::Email);
        let job = receiver.try_recv().expect("job enqueued");
        assert_eq!(job.notification_id, notification.id);
        assert_eq!(job.attempt, 1);
    }

    #[test]
    fn fax_preference_without_number_falls_back_to_email() {
        let mut user = constituent("usr-n2");
        user.communication_preference = CommunicationPreference::Fax;
        user.fax = None;
        assert_eq!(delivery_method_for(&user), DeliveryMethod::Email);

        user.fax = Some("410-555-0100".to_string());
        assert_eq!(delivery_method_for(&user), DeliveryMethod::Fax);
    }

    #[test]
    fn unknown_recipient_is_reported() {
        let store = Arc::new(MemoryStore::default());
        let (service, _receiver) = service(&store);
        let err = service
            .notify(
                &UserId("usr-missing".to_string()),
                None,
                NotificationAction::VoucherExpired {
                    code: "X".to_string(),
                },
                Utc::now(),
            )
            .expect_err("recipient missing");
        assert!(matches!(err, NotificationError::UnknownRecipient(_)));
    }

    #[test]
    fn delivery_status_updates_ignore_regressions() {
        let store = Arc::new(MemoryStore::default());
        store.insert_user(constituent("usr-n3")).expect("insert");
        let (service, _receiver) = service(&store);
        let mut notification = service
            .notify(
                &UserId("usr-n3".to_string()),
                None,
                NotificationAction::VoucherExpired {
                    code: "X".to_string(),
                },
                Utc::now(),
            )
            .expect("queued");
        notification.message_id = Some("pm-123".to_string());
        notification.delivery_status = DeliveryStatus::Sent;
        store.update_notification(notification).expect("update");

        let opened = service
            .record_delivery_status("pm-123", DeliveryStatus::Opened, None, Utc::now())
            .expect("update")
            .expect("found");
        assert_eq!(opened.delivery_status, DeliveryStatus::Opened);

        let stale = service
            .record_delivery_status("pm-123", DeliveryStatus::Delivered, None, Utc::now())
            .expect("update")
            .expect("found");
        assert_eq!(stale.delivery_status, DeliveryStatus::Opened);

        assert!(service
            .record_delivery_status("pm-unknown", DeliveryStatus::Delivered, None, Utc::now())
            .expect("lookup")
            .is_none());
    }
}
