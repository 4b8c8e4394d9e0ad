use super::domain::{Application, ApplicationId, ApplicationStatus};
use crate::store::RepositoryError;
use crate::workflows::accounts::UserId;

/// Storage abstraction so the service module can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    /// Fails with `Conflict` when the id is taken or the owner already holds an active
    /// application.
    fn insert_application(&self, application: Application) -> Result<Application, RepositoryError>;
    /// Replace `current` with `updated`. Fails with `Conflict` when the stored record no longer
    /// equals `current`.
    fn update_application(
        &self,
        current: &Application,
        updated: Application,
    ) -> Result<(), RepositoryError>;
    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;
    fn applications_for_user(&self, user_id: &UserId) -> Result<Vec<Application>, RepositoryError>;
    fn applications_with_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<Application>, RepositoryError>;
}
