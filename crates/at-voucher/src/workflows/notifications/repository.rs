use super::domain::{Notification, NotificationId};
use crate::store::RepositoryError;
use crate::workflows::accounts::UserId;

pub trait NotificationRepository: Send + Sync {
    fn insert_notification(&self, notification: Notification) -> Result<(), RepositoryError>;
    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError>;
    fn fetch_notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;
    fn find_notification_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<Notification>, RepositoryError>;
    fn notifications_for(&self, recipient: &UserId) -> Result<Vec<Notification>, RepositoryError>;
}
