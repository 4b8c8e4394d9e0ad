use std::sync::{Arc, LazyLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::store::RepositoryError;
use crate::workflows::accounts::{User, UserRepository, UserRole};
use crate::workflows::applications::service::{
    ApplicationService, ApplicationServiceError, CertificationDecision,
};
use crate::workflows::applications::ApplicationId;
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::notifications::{NotificationAction, NotificationService};
use crate::workflows::proofs::attachment::validate;
use crate::workflows::proofs::service::sanitize_filename;
use crate::workflows::proofs::{
    DocumentStore, ProofError, ProofService, ProofType, SubmissionChannel, UploadedDocument,
};

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+").expect("invalid address pattern")
});
static PROOF_MAILBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^proof(\+[^@]*)?@").expect("invalid proof mailbox pattern")
});
static CERTIFICATION_MAILBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^medical-certification(\+[^@]*)?@")
        .expect("invalid certification mailbox pattern")
});
static APPLICATION_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bapp-\d{6,}\b").expect("invalid application reference pattern")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmailAddress {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundAttachment {
    pub name: String,
    /// Base64-encoded bytes.
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_length: Option<u64>,
}

/// Postmark inbound webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundEmail {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub from_full: Option<EmailAddress>,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub to_full: Vec<EmailAddress>,
    #[serde(default)]
    pub original_recipient: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "MessageID", default)]
    pub message_id: String,
    #[serde(default)]
    pub text_body: String,
    #[serde(default)]
    pub attachments: Vec<InboundAttachment>,
}

impl InboundEmail {
    pub fn sender(&self) -> Option<String> {
        self.from_full
            .as_ref()
            .map(|address| address.email.clone())
            .filter(|email| !email.is_empty())
            .or_else(|| ADDRESS.find(&self.from).map(|found| found.as_str().to_string()))
            .map(|email| email.to_ascii_lowercase())
    }

    pub fn recipients(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .to_full
            .iter()
            .map(|address| address.email.clone())
            .collect();
        if addresses.is_empty() {
            addresses.extend(ADDRESS.find_iter(&self.to).map(|found| found.as_str().to_string()));
        }
        if let Some(original) = &self.original_recipient {
            addresses.push(original.clone());
        }
        addresses
            .into_iter()
            .map(|address| address.trim().to_ascii_lowercase())
            .filter(|address| !address.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mailbox {
    Proof,
    MedicalCertification,
}

/// First recipient address that names a known mailbox.
pub fn route(email: &InboundEmail) -> Option<Mailbox> {
    email.recipients().iter().find_map(|address| {
        if PROOF_MAILBOX.is_match(address) {
            Some(Mailbox::Proof)
        } else if CERTIFICATION_MAILBOX.is_match(address) {
            Some(Mailbox::MedicalCertification)
        } else {
            None
        }
    })
}

/// `income` or `residency` named in the subject; ambiguous subjects yield `None`.
pub fn proof_type_from_subject(subject: &str) -> Option<ProofType> {
    let subject = subject.to_ascii_lowercase();
    let income = subject.contains("income");
    let residency = subject.contains("residency") || subject.contains("residence");
    match (income, residency) {
        (true, false) => Some(ProofType::Income),
        (false, true) => Some(ProofType::Residency),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MailboxOutcome {
    ProofSubmitted {
        application_id: ApplicationId,
        proof_type: ProofType,
        submission_id: String,
    },
    CertificationReceived {
        application_id: ApplicationId,
    },
    Bounced {
        reason: String,
    },
}

/// Only storage failures escape; everything else bounces the message.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

struct Bounce(String);

impl Bounce {
    fn new(reason: impl Into<String>) -> Self {
        Bounce(reason.into())
    }
}

enum Failure {
    Bounce(Bounce),
    Repository(RepositoryError),
}

impl From<Bounce> for Failure {
    fn from(bounce: Bounce) -> Self {
        Failure::Bounce(bounce)
    }
}

impl From<RepositoryError> for Failure {
    fn from(err: RepositoryError) -> Self {
        Failure::Repository(err)
    }
}

impl From<ProofError> for Failure {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::Repository(err) => Failure::Repository(err),
            other => Failure::Bounce(Bounce(other.to_string())),
        }
    }
}

impl From<ApplicationServiceError> for Failure {
    fn from(err: ApplicationServiceError) -> Self {
        match err {
            ApplicationServiceError::Repository(err) => Failure::Repository(err),
            other => Failure::Bounce(Bounce(other.to_string())),
        }
    }
}

/// Routes inbound mail to the proof or medical certification handlers.
pub struct MailboxRouter {
    users: Arc<dyn UserRepository>,
    applications: Arc<ApplicationService>,
    proofs: Arc<ProofService>,
    documents: Arc<dyn DocumentStore>,
    events: Arc<dyn EventLog>,
    notifications: Arc<NotificationService>,
}

impl MailboxRouter {
    pub fn new(
        users: Arc<dyn UserRepository>,
        applications: Arc<ApplicationService>,
        proofs: Arc<ProofService>,
        documents: Arc<dyn DocumentStore>,
        events: Arc<dyn EventLog>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            users,
            applications,
            proofs,
            documents,
            events,
            notifications,
        }
    }

    pub fn process(
        &self,
        email: &InboundEmail,
        now: DateTime<Utc>,
    ) -> Result<MailboxOutcome, MailboxError> {
        let sender = match email.sender() {
            Some(address) => self.users.find_user_by_email(&address)?,
            None => None,
        };

        let result = match route(email) {
            Some(Mailbox::Proof) => self.receive_proof(email, sender.as_ref(), now),
            Some(Mailbox::MedicalCertification) => self.receive_certification(email, now),
            None => Err(Bounce::new("no mailbox handles this address").into()),
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(Failure::Repository(err)) => Err(err.into()),
            Err(Failure::Bounce(Bounce(reason))) => {
                self.bounce(email, sender.as_ref(), &reason, now);
                Ok(MailboxOutcome::Bounced { reason })
            }
        }
    }

    fn receive_proof(
        &self,
        email: &InboundEmail,
        sender: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<MailboxOutcome, Failure> {
        let constituent = sender
            .filter(|user| user.role == UserRole::Constituent)
            .ok_or_else(|| Bounce::new("sender is not a registered constituent"))?;
        let application = self
            .applications
            .active_for_user(&constituent.id)?
            .ok_or_else(|| Bounce::new("sender has no active application"))?;
        let proof_type = proof_type_from_subject(&email.subject).ok_or_else(|| {
            Bounce::new("subject must say whether the document is income or residency proof")
        })?;
        let document = first_document(email)?;

        let submission = self.proofs.submit(
            constituent,
            &application.id,
            proof_type,
            document,
            SubmissionChannel::Email,
            now,
        )?;
        info!(
            application = %application.id,
            proof = proof_type.label(),
            message_id = %email.message_id,
            "proof received by email"
        );
        Ok(MailboxOutcome::ProofSubmitted {
            application_id: application.id,
            proof_type,
            submission_id: submission.id,
        })
    }

    fn receive_certification(
        &self,
        email: &InboundEmail,
        now: DateTime<Utc>,
    ) -> Result<MailboxOutcome, Failure> {
        let reference = APPLICATION_REFERENCE
            .find(&email.subject)
            .or_else(|| APPLICATION_REFERENCE.find(&email.text_body))
            .ok_or_else(|| Bounce::new("message does not reference an application number"))?;
        let application_id = ApplicationId(reference.as_str().to_ascii_lowercase());
        let application = self.applications.find(&application_id)?;

        let provider_email = application
            .medical_provider
            .as_ref()
            .and_then(|provider| provider.email.clone());
        let sender = email.sender();
        if provider_email.is_none() || provider_email != sender {
            return Err(Bounce::new("sender is not the certifying provider on file").into());
        }

        let document = first_document(email)?;
        let mime = validate(&document).map_err(|err| Bounce(err.to_string()))?;
        let key = format!(
            "certifications/{}/{}-{}",
            application.id,
            sanitize_filename(&email.message_id),
            sanitize_filename(&document.filename)
        );
        self.documents.put_document(&key, document.bytes)?;

        self.applications.record_medical_certification(
            None,
            &application.id,
            CertificationDecision::Received,
            now,
        )?;
        audit::record(
            self.events.as_ref(),
            Event::new(
                None,
                "medical_certification_received",
                "application",
                &application.id.0,
                json!({
                    "storage_key": key,
                    "content_type": mime.essence_str(),
                    "message_id": email.message_id,
                }),
                now,
            ),
        );
        Ok(MailboxOutcome::CertificationReceived {
            application_id: application.id,
        })
    }

    fn bounce(&self, email: &InboundEmail, sender: Option<&User>, reason: &str, now: DateTime<Utc>) {
        warn!(
            message_id = %email.message_id,
            from = %email.from,
            reason,
            "inbound email bounced"
        );
        audit::record(
            self.events.as_ref(),
            Event::new(
                sender.map(|user| &user.id),
                "inbound_email_bounced",
                "inbound_email",
                &email.message_id,
                json!({
                    "from": email.from,
                    "subject": email.subject,
                    "reason": reason,
                }),
                now,
            ),
        );
        if let Some(user) = sender {
            self.notifications.dispatch(
                &user.id,
                None,
                NotificationAction::InboundEmailBounced {
                    subject: email.subject.clone(),
                    reason: reason.to_string(),
                },
                now,
            );
        }
    }
}

/// One document per message; extra attachments are ignored.
fn first_document(email: &InboundEmail) -> Result<UploadedDocument, Bounce> {
    let attachment = email
        .attachments
        .first()
        .ok_or_else(|| Bounce::new("message has no attachment"))?;
    if email.attachments.len() > 1 {
        warn!(
            message_id = %email.message_id,
            ignored = email.attachments.len() - 1,
            "only the first attachment is processed"
        );
    }
    let compact: String = attachment
        .content
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|_| Bounce(format!("attachment '{}' could not be decoded", attachment.name)))?;
    Ok(UploadedDocument {
        filename: attachment.name.clone(),
        content_type: attachment.content_type.clone(),
        bytes,
    })
}
