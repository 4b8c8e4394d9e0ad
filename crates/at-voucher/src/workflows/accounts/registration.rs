use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::domain::{
    CommunicationPreference, MailingAddress, User, UserId, UserRole, VendorStatus,
};
use super::repository::UserRepository;
use crate::store::RepositoryError;
use crate::workflows::applications::FormErrors;
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::sequence::Sequence;

static USER_SEQUENCE: Sequence = Sequence::new("usr");

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+$")
        .expect("invalid email pattern")
});

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(FormErrors),
    #[error("an account already uses {0}")]
    EmailTaken(String),
    #[error("user {0} not found")]
    NotFound(UserId),
    #[error("{0} is not a vendor account")]
    NotAVendor(UserId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Contact details supplied when an account is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub fax: Option<String>,
    #[serde(default)]
    pub address: Option<MailingAddress>,
    #[serde(default)]
    pub communication_preference: CommunicationPreference,
}

impl AccountForm {
    fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        if !EMAIL.is_match(self.email.trim()) {
            errors.add("email", "is not a valid email address");
        }
        if self.first_name.trim().is_empty() {
            errors.add("first_name", "can't be blank");
        }
        if self.last_name.trim().is_empty() {
            errors.add("last_name", "can't be blank");
        }
        if self.communication_preference == CommunicationPreference::Fax
            && blank(&self.fax).is_none()
        {
            errors.add("fax", "is required for fax delivery");
        }
        if self.communication_preference == CommunicationPreference::Letter
            && self.address.is_none()
        {
            errors.add("address", "is required for letter delivery");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Opening accounts: constituent self-registration and administrator provisioning.
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventLog>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepository>, events: Arc<dyn EventLog>) -> Self {
        Self { users, events }
    }

    /// Public sign-up. Always yields a constituent account.
    pub fn register_constituent(
        &self,
        form: AccountForm,
        now: DateTime<Utc>,
    ) -> Result<User, AccountError> {
        self.open(None, form, UserRole::Constituent, now)
    }

    /// An administrator opens an account with any role. Vendors start out pending approval.
    pub fn create_user(
        &self,
        admin: &User,
        form: AccountForm,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<User, AccountError> {
        self.open(Some(&admin.id), form, role, now)
    }

    /// Ensure an administrator exists for `email`; used when a fresh service starts.
    pub fn bootstrap_administrator(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AccountError> {
        if let Some(existing) = self.users.find_user_by_email(email)? {
            return Ok(existing);
        }
        let form = AccountForm {
            email: email.to_string(),
            first_name: "Program".to_string(),
            last_name: "Administrator".to_string(),
            ..AccountForm::default()
        };
        self.open(None, form, UserRole::Administrator, now)
    }

    pub fn set_vendor_status(
        &self,
        admin: &User,
        id: &UserId,
        status: VendorStatus,
        now: DateTime<Utc>,
    ) -> Result<User, AccountError> {
        let current = self
            .users
            .fetch_user(id)?
            .ok_or_else(|| AccountError::NotFound(id.clone()))?;
        if current.role != UserRole::Vendor {
            return Err(AccountError::NotAVendor(id.clone()));
        }
        let mut vendor = current.clone();
        vendor.vendor_status = Some(status);
        self.users.update_user(&current, vendor.clone())?;

        info!(vendor = %vendor.id, ?status, "vendor status changed");
        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&admin.id),
                "vendor_status_changed",
                "user",
                &vendor.id.0,
                json!({ "from": current.vendor_status, "to": status }),
                now,
            ),
        );
        Ok(vendor)
    }

    fn open(
        &self,
        actor_id: Option<&UserId>,
        form: AccountForm,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<User, AccountError> {
        form.validate().map_err(AccountError::Validation)?;
        let email = form.email.trim().to_string();
        let user = User {
            id: UserId(USER_SEQUENCE.next_id()),
            email: email.clone(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            role,
            phone: blank(&form.phone),
            fax: blank(&form.fax),
            address: form.address,
            communication_preference: form.communication_preference,
            vendor_status: (role == UserRole::Vendor).then_some(VendorStatus::Pending),
        };

        let stored = match self.users.insert_user(user) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => return Err(AccountError::EmailTaken(email)),
            Err(other) => return Err(other.into()),
        };

        info!(user = %stored.id, role = stored.role.label(), "account opened");
        audit::record(
            self.events.as_ref(),
            Event::new(
                actor_id.or(Some(&stored.id)),
                "user_created",
                "user",
                &stored.id.0,
                json!({ "role": stored.role }),
                now,
            ),
        );
        Ok(stored)
    }
}
