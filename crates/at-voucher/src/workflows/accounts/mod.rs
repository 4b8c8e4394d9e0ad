//! User accounts: registration, role scoping, and password reset tokens.

pub mod domain;
pub mod guard;
pub mod password_reset;
pub mod registration;
pub mod repository;
pub(crate) mod router;

pub use domain::{
    CommunicationPreference, MailingAddress, PasswordResetToken, User, UserId, UserRole,
    VendorStatus,
};
pub use guard::{authorize, AuthorizationError, ACTOR_HEADER};
pub use password_reset::{PasswordResetError, PasswordResetService};
pub use registration::{AccountError, AccountForm, AccountService};
pub use repository::{CredentialStore, ResetTokenRepository, UserRepository};
