use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::domain::PasswordResetToken;
use super::repository::{CredentialStore, ResetTokenRepository, UserRepository};
use crate::store::RepositoryError;
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::notifications::{NotificationAction, NotificationService};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum PasswordResetError {
    #[error("reset link is invalid or has expired")]
    InvalidToken,
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct PasswordResetService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn ResetTokenRepository>,
    credentials: Arc<dyn CredentialStore>,
    events: Arc<dyn EventLog>,
    notifications: Arc<NotificationService>,
    ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn ResetTokenRepository>,
        credentials: Arc<dyn CredentialStore>,
        events: Arc<dyn EventLog>,
        notifications: Arc<NotificationService>,
        ttl: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            credentials,
            events,
            notifications,
            ttl,
        }
    }

    /// Email a single-use reset code. Unknown addresses succeed without doing anything so
    /// callers cannot discover which emails have accounts.
    pub fn request(&self, email: &str, now: DateTime<Utc>) -> Result<(), PasswordResetError> {
        let Some(user) = self.users.find_user_by_email(email.trim())? else {
            debug!("password reset requested for unknown address");
            return Ok(());
        };

        let mut secret = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut secret);
        let token = hex::encode(secret);
        let expires_at = now + self.ttl;

        self.tokens.insert_token(PasswordResetToken {
            user_id: user.id.clone(),
            digest: digest(&token),
            expires_at,
            used_at: None,
        })?;

        info!(user = %user.id, "password reset issued");
        audit::record(
            self.events.as_ref(),
            Event::new(
                None,
                "password_reset_requested",
                "user",
                &user.id.0,
                json!({ "expires_at": expires_at }),
                now,
            ),
        );
        self.notifications.dispatch(
            &user.id,
            None,
            NotificationAction::PasswordReset { token, expires_at },
            now,
        );
        Ok(())
    }

    pub fn reset(
        &self,
        token: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PasswordResetError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(PasswordResetError::PasswordTooShort);
        }
        let digest = digest(token.trim());
        // Claiming the token first means a second request with it finds nothing usable.
        let stored = self
            .tokens
            .consume_token(&digest, now)?
            .ok_or(PasswordResetError::InvalidToken)?;

        self.credentials.set_password(&stored.user_id, password)?;

        info!(user = %stored.user_id, "password reset completed");
        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&stored.user_id),
                "password_reset",
                "user",
                &stored.user_id.0,
                json!({}),
                now,
            ),
        );
        Ok(())
    }
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::accounts::UserId;
    use crate::workflows::notifications::NotificationRepository;
    use crate::workflows::testing::{constituent, harness};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).single().expect("valid time")
    }

    fn issued_token(harness: &crate::workflows::testing::Harness, user_id: &UserId) -> String {
        let notifications = harness
            .store
            .notifications_for(user_id)
            .expect("notifications");
        notifications
            .into_iter()
            .find_map(|notification| match notification.action {
                NotificationAction::PasswordReset { token, .. } => Some(token),
                _ => None,
            })
            .expect("reset notification queued")
    }

    #[test]
    fn token_resets_password_once() {
        let harness = harness();
        let user = harness
            .store
            .insert_user(constituent("usr-pw1"))
            .expect("insert");
        let resets = &harness.services.password_resets;

        resets.request(&user.email.to_uppercase(), now()).expect("request");
        let token = issued_token(&harness, &user.id);
        assert_eq!(token.len(), TOKEN_BYTES * 2);

        resets
            .reset(&token, "correct horse", now() + Duration::minutes(5))
            .expect("reset");
        assert_eq!(
            harness.store.password_for(&user.id).as_deref(),
            Some("correct horse")
        );
        assert!(matches!(
            resets.reset(&token, "another password", now() + Duration::minutes(6)),
            Err(PasswordResetError::InvalidToken)
        ));
    }

    #[test]
    fn expired_tokens_and_short_passwords_are_refused() {
        let harness = harness();
        let user = harness
            .store
            .insert_user(constituent("usr-pw2"))
            .expect("insert");
        let resets = &harness.services.password_resets;
        resets.request(&user.email, now()).expect("request");
        let token = issued_token(&harness, &user.id);

        assert!(matches!(
            resets.reset(&token, "short", now()),
            Err(PasswordResetError::PasswordTooShort)
        ));
        assert!(matches!(
            resets.reset(&token, "long enough", now() + Duration::minutes(121)),
            Err(PasswordResetError::InvalidToken)
        ));
    }

    #[test]
    fn unknown_email_is_silent() {
        let harness = harness();
        harness
            .services
            .password_resets
            .request("nobody@example.org", now())
            .expect("no enumeration");
    }

    #[test]
    fn concurrent_resets_with_one_token_succeed_once() {
        let harness = harness();
        let user = harness
            .store
            .insert_user(constituent("usr-pw3"))
            .expect("insert");
        harness
            .services
            .password_resets
            .request(&user.email, now())
            .expect("request");
        let token = issued_token(&harness, &user.id);

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
        let outcomes: Vec<_> = ["first passphrase", "second passphrase"]
            .into_iter()
            .map(|password| {
                let services = harness.services.clone();
                let barrier = barrier.clone();
                let token = token.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    services
                        .password_resets
                        .reset(&token, password, now() + Duration::minutes(1))
                        .map(|()| password)
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().expect("reset thread"))
            .collect();

        let winners: Vec<_> = outcomes.iter().filter_map(|outcome| outcome.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(PasswordResetError::InvalidToken))));
        assert_eq!(
            harness.store.password_for(&user.id).as_deref(),
            Some(*winners[0])
        );
    }
}
