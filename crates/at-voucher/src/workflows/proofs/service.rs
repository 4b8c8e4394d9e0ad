use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::attachment::{validate, AttachmentError, DocumentStore, UploadedDocument};
use super::domain::{
    ProofAttachment, ProofReview, ProofStatus, ProofSubmission, ProofSubmissionAudit, ProofType,
    ReviewDecision, SubmissionChannel,
};
use super::rate_limit::{ProofRateLimiter, RateLimitExceeded};
use super::repository::{ProofRepository, SubmissionWrite, SubmissionWriteError};
use crate::store::RepositoryError;
use crate::workflows::accounts::User;
use crate::workflows::applications::service::archive_in_place;
use crate::workflows::applications::{
    Application, ApplicationId, ApplicationRepository, ApplicationStatus,
};
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::notifications::{NotificationAction, NotificationService};
use crate::workflows::sequence::Sequence;

static SUBMISSION_SEQUENCE: Sequence = Sequence::new("prf");

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("you do not have access to this application")]
    Forbidden,
    #[error("application is {} and is not accepting documents", .0.label())]
    ApplicationClosed(ApplicationStatus),
    #[error("{} proof is already {status:?}", .proof_type.label())]
    AlreadyPending {
        proof_type: ProofType,
        status: ProofStatus,
    },
    #[error("{} proof has no submission awaiting review", .0.label())]
    NothingToReview(ProofType),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<SubmissionWriteError> for ProofError {
    fn from(err: SubmissionWriteError) -> Self {
        match err {
            SubmissionWriteError::RateLimited(limited) => ProofError::RateLimited(limited),
            SubmissionWriteError::Repository(repository) => ProofError::Repository(repository),
        }
    }
}

/// Intake and review of income and residency documents.
pub struct ProofService {
    applications: Arc<dyn ApplicationRepository>,
    proofs: Arc<dyn ProofRepository>,
    documents: Arc<dyn DocumentStore>,
    events: Arc<dyn EventLog>,
    notifications: Arc<NotificationService>,
    limiter: ProofRateLimiter,
    max_rejections: u32,
}

impl ProofService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        proofs: Arc<dyn ProofRepository>,
        documents: Arc<dyn DocumentStore>,
        events: Arc<dyn EventLog>,
        notifications: Arc<NotificationService>,
        limiter: ProofRateLimiter,
        max_rejections: u32,
    ) -> Self {
        Self {
            applications,
            proofs,
            documents,
            events,
            notifications,
            limiter,
            max_rejections,
        }
    }

    /// Accept a document from the constituent through `channel`.
    pub fn submit(
        &self,
        constituent: &User,
        application_id: &ApplicationId,
        proof_type: ProofType,
        document: UploadedDocument,
        channel: SubmissionChannel,
        now: DateTime<Utc>,
    ) -> Result<ProofSubmission, ProofError> {
        let stored = self.fetch(application_id)?;
        if stored.user_id != constituent.id {
            return Err(ProofError::Forbidden);
        }
        if !stored.status.is_under_review() {
            return Err(ProofError::ApplicationClosed(stored.status));
        }
        let previous = stored.proof_status(proof_type);
        if !previous.accepts_submission() {
            return Err(ProofError::AlreadyPending {
                proof_type,
                status: previous,
            });
        }

        // Checked again when the submission is written.
        let recent = self
            .proofs
            .audits_since(&constituent.id, self.limiter.window_start(now))?;
        if let Err(limited) = self.limiter.check(channel, &recent, now) {
            warn!(user = %constituent.id, ?channel, "proof submission rate limited");
            return Err(limited.into());
        }

        let mime = validate(&document)?;
        let submission_id = SUBMISSION_SEQUENCE.next_id();
        let storage_key = format!(
            "proofs/{}/{}/{}-{}",
            stored.id,
            proof_type.label(),
            submission_id,
            sanitize_filename(&document.filename)
        );
        let byte_size = document.bytes.len();
        self.documents.put_document(&storage_key, document.bytes)?;

        let submission = ProofSubmission {
            id: submission_id,
            application_id: stored.id.clone(),
            user_id: constituent.id.clone(),
            proof_type,
            channel,
            attachment: ProofAttachment {
                filename: document.filename,
                content_type: mime.essence_str().to_string(),
                byte_size,
                storage_key,
            },
            submitted_at: now,
        };
        let audit_row = ProofSubmissionAudit {
            application_id: stored.id.clone(),
            user_id: constituent.id.clone(),
            proof_type,
            channel,
            submitted_at: now,
            metadata: json!({
                "submission_id": submission.id,
                "filename": submission.attachment.filename,
                "content_type": submission.attachment.content_type,
                "byte_size": byte_size,
                "resubmission": previous == ProofStatus::Rejected,
            }),
        };

        let mut application = stored.clone();
        application.set_proof_status(proof_type, ProofStatus::Submitted);
        application.updated_at = now;
        let write = SubmissionWrite {
            current: stored,
            updated: application.clone(),
            submission: submission.clone(),
            audit: audit_row,
        };
        if let Err(err) = self.proofs.record_submission(write, &self.limiter) {
            let key = &submission.attachment.storage_key;
            if let Err(cleanup) = self.documents.delete_document(key) {
                warn!(
                    key = %key,
                    error = %cleanup,
                    "could not remove document for refused submission"
                );
            }
            return Err(err.into());
        }

        info!(
            application = %application.id,
            proof = proof_type.label(),
            ?channel,
            "proof submitted"
        );
        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&constituent.id),
                "proof_submitted",
                "application",
                &application.id.0,
                json!({ "proof_type": proof_type, "channel": channel }),
                now,
            ),
        );
        Ok(submission)
    }

    /// Approve or reject the pending document of `proof_type`.
    pub fn review(
        &self,
        admin: &User,
        application_id: &ApplicationId,
        proof_type: ProofType,
        decision: ReviewDecision,
        now: DateTime<Utc>,
    ) -> Result<Application, ProofError> {
        let current = self.fetch(application_id)?;
        if !current.status.is_under_review() {
            return Err(ProofError::ApplicationClosed(current.status));
        }
        if current.proof_status(proof_type) != ProofStatus::Submitted {
            return Err(ProofError::NothingToReview(proof_type));
        }

        let mut application = current.clone();
        let mut archived_reason = None;
        let action = match &decision {
            ReviewDecision::Approved => {
                application.set_proof_status(proof_type, ProofStatus::Approved);
                NotificationAction::ProofApproved {
                    application_id: application.id.0.clone(),
                    proof_type,
                }
            }
            ReviewDecision::Rejected(reason) => {
                application.set_proof_status(proof_type, ProofStatus::Rejected);
                application.rejection_count += 1;
                if application.rejection_count >= self.max_rejections {
                    let reason = format!(
                        "proof was rejected {} times",
                        application.rejection_count
                    );
                    archive_in_place(&mut application, &reason, now);
                    archived_reason = Some(reason);
                } else {
                    application.status = ApplicationStatus::NeedsInformation;
                }
                NotificationAction::ProofRejected {
                    application_id: application.id.0.clone(),
                    proof_type,
                    reason: reason.description(),
                }
            }
        };
        application.updated_at = now;
        self.proofs.record_review(
            &current,
            application.clone(),
            ProofReview {
                application_id: application.id.clone(),
                proof_type,
                admin_id: admin.id.clone(),
                decision: decision.clone(),
                reviewed_at: now,
            },
        )?;

        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&admin.id),
                match decision {
                    ReviewDecision::Approved => "proof_approved",
                    ReviewDecision::Rejected(_) => "proof_rejected",
                },
                "application",
                &application.id.0,
                json!({ "proof_type": proof_type, "decision": decision }),
                now,
            ),
        );
        self.notifications
            .dispatch(&application.user_id, Some(&admin.id), action, now);

        if let Some(reason) = archived_reason {
            warn!(application = %application.id, %reason, "application archived after repeated rejections");
            audit::record(
                self.events.as_ref(),
                Event::new(
                    Some(&admin.id),
                    "application_archived",
                    "application",
                    &application.id.0,
                    json!({ "reason": reason }),
                    now,
                ),
            );
            self.notifications.dispatch(
                &application.user_id,
                Some(&admin.id),
                NotificationAction::ApplicationArchived {
                    application_id: application.id.0.clone(),
                    reason,
                },
                now,
            );
        }
        Ok(application)
    }

    pub fn submissions(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ProofSubmission>, ProofError> {
        Ok(self.proofs.submissions_for(application_id)?)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Application, ProofError> {
        self.applications
            .fetch_application(id)?
            .ok_or_else(|| ProofError::NotFound(id.clone()))
    }
}

pub(crate) fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::workflows::accounts::UserRepository;
    use crate::workflows::notifications::NotificationRepository;
    use crate::workflows::proofs::RejectionReason;
    use crate::workflows::testing::{harness, submitted_application};

    fn pdf(name: &str) -> UploadedDocument {
        UploadedDocument {
            filename: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: b"%PDF-1.7 scanned".to_vec(),
        }
    }

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn filenames_are_flattened() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\scans\\pay stub (1).pdf"), "pay_stub__1_.pdf");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[test]
    fn rejected_proof_can_be_resubmitted() {
        let harness = harness();
        let application = submitted_application(&harness, "usr-proof1");
        let owner = harness
            .store
            .fetch_user(&application.user_id)
            .expect("fetch")
            .expect("owner");
        let proofs = &harness.services.proofs;
        let now = morning();

        proofs
            .submit(
                &owner,
                &application.id,
                ProofType::Income,
                pdf("w2.pdf"),
                SubmissionChannel::Web,
                now,
            )
            .expect("first upload");
        let reviewed = proofs
            .review(
                &harness.admin,
                &application.id,
                ProofType::Income,
                ReviewDecision::Rejected(RejectionReason::Expired),
                now + Duration::minutes(5),
            )
            .expect("reject");
        assert_eq!(reviewed.status, ApplicationStatus::NeedsInformation);
        assert_eq!(reviewed.income_proof, ProofStatus::Rejected);
        assert_eq!(reviewed.rejection_count, 1);

        let again = proofs.submit(
            &owner,
            &application.id,
            ProofType::Income,
            pdf("w2-2024.pdf"),
            SubmissionChannel::Web,
            now + Duration::minutes(10),
        );
        assert!(again.is_ok(), "{again:?}");
        let stored = harness
            .store
            .fetch_application(&application.id)
            .expect("fetch")
            .expect("application");
        assert_eq!(stored.income_proof, ProofStatus::Submitted);
        assert_eq!(stored.status, ApplicationStatus::NeedsInformation);
        assert_eq!(proofs.submissions(&application.id).expect("submissions").len(), 2);

        let pending = proofs.submit(
            &owner,
            &application.id,
            ProofType::Income,
            pdf("w2-copy.pdf"),
            SubmissionChannel::Web,
            now + Duration::minutes(11),
        );
        assert!(matches!(pending, Err(ProofError::AlreadyPending { .. })));
    }

    #[test]
    fn final_permitted_rejection_archives_and_notifies() {
        let harness = harness();
        let seeded = submitted_application(&harness, "usr-proof2");
        let mut near_cap = seeded.clone();
        near_cap.rejection_count = 7;
        harness
            .store
            .update_application(&seeded, near_cap)
            .expect("seed rejections");
        let owner = harness
            .store
            .fetch_user(&seeded.user_id)
            .expect("fetch")
            .expect("owner");
        let proofs = &harness.services.proofs;
        let now = morning();

        proofs
            .submit(
                &owner,
                &seeded.id,
                ProofType::Residency,
                pdf("lease.pdf"),
                SubmissionChannel::Web,
                now,
            )
            .expect("upload");
        let archived = proofs
            .review(
                &harness.admin,
                &seeded.id,
                ProofType::Residency,
                ReviewDecision::Rejected(RejectionReason::AddressMismatch),
                now,
            )
            .expect("reject");
        assert_eq!(archived.rejection_count, 8);
        assert_eq!(archived.status, ApplicationStatus::Archived);
        assert!(archived
            .status_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("8 times")));

        let notices = harness
            .store
            .notifications_for(&owner.id)
            .expect("notifications");
        assert!(notices.iter().any(|notice| matches!(
            &notice.action,
            NotificationAction::ApplicationArchived { application_id, .. } if *application_id == seeded.id.0
        )));

        let closed = proofs.submit(
            &owner,
            &seeded.id,
            ProofType::Residency,
            pdf("lease-2.pdf"),
            SubmissionChannel::Web,
            now + Duration::minutes(1),
        );
        assert!(matches!(
            closed,
            Err(ProofError::ApplicationClosed(ApplicationStatus::Archived))
        ));
    }

    #[test]
    fn concurrent_uploads_respect_the_hourly_limit() {
        let harness = harness();
        let owners: Vec<_> = (0..8)
            .map(|n| {
                let application = submitted_application(&harness, &format!("usr-burst{n}"));
                (application.id, application.user_id)
            })
            .collect();
        // One submitter owns all eight applications so their uploads share one window.
        let submitter = harness
            .store
            .fetch_user(&owners[0].1)
            .expect("fetch")
            .expect("owner");
        for (id, _) in &owners[1..] {
            let current = harness
                .store
                .fetch_application(id)
                .expect("fetch")
                .expect("application");
            let mut moved = current.clone();
            moved.user_id = submitter.id.clone();
            harness
                .store
                .update_application(&current, moved)
                .expect("reassign");
        }

        let now = morning();
        let barrier = Arc::new(Barrier::new(owners.len()));
        let outcomes: Vec<_> = owners
            .iter()
            .map(|(id, _)| {
                let services = harness.services.clone();
                let submitter = submitter.clone();
                let barrier = barrier.clone();
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    services.proofs.submit(
                        &submitter,
                        &id,
                        ProofType::Income,
                        pdf("w2.pdf"),
                        SubmissionChannel::Web,
                        now,
                    )
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().expect("upload thread"))
            .collect();

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 5);
        assert!(outcomes
            .iter()
            .filter(|outcome| outcome.is_err())
            .all(|outcome| matches!(outcome, Err(ProofError::RateLimited(_)))));
        let audits = harness
            .store
            .audits_since(&submitter.id, now - Duration::hours(1))
            .expect("audits");
        assert_eq!(audits.len(), 5);
    }
}
