use chrono::{DateTime, Utc};

use super::domain::{PasswordResetToken, User, UserId, UserRole};
use crate::store::RepositoryError;

pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the id or the (case-insensitive) email is taken.
    fn insert_user(&self, user: User) -> Result<User, RepositoryError>;
    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    /// Replace `current` with `updated`. Fails with `Conflict` when the stored user no longer
    /// equals `current`.
    fn update_user(&self, current: &User, updated: User) -> Result<(), RepositoryError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    fn users_with_role(&self, role: UserRole) -> Result<Vec<User>, RepositoryError>;
}

/// Password storage lives with the authentication layer; this service only hands it a new secret.
pub trait CredentialStore: Send + Sync {
    fn set_password(&self, user_id: &UserId, password: &str) -> Result<(), RepositoryError>;
}

pub trait ResetTokenRepository: Send + Sync {
    fn insert_token(&self, token: PasswordResetToken) -> Result<(), RepositoryError>;
    /// Mark the token used and return it, if it exists and is still usable at `now`.
    fn consume_token(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PasswordResetToken>, RepositoryError>;
}
