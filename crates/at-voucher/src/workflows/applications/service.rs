use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, MedicalCertificationStatus,
};
use super::eligibility::IncomeThreshold;
use super::form::{ApplicationForm, FormErrors, SubmissionIntent, ValidatedApplication};
use super::repository::ApplicationRepository;
use crate::store::RepositoryError;
use crate::workflows::accounts::{User, UserId, UserRepository, UserRole};
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::evaluations::{Evaluation, EvaluationError, EvaluationService};
use crate::workflows::notifications::{NotificationAction, NotificationService};
use crate::workflows::proofs::ProofStatus;
use crate::workflows::sequence::Sequence;
use crate::workflows::vouchers::{Voucher, VoucherError, VoucherService};

static APPLICATION_SEQUENCE: Sequence = Sequence::new("app");

fn next_application_id() -> ApplicationId {
    ApplicationId(APPLICATION_SEQUENCE.next_id())
}

/// Outcome reported for a medical certification, by an administrator or the provider mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CertificationDecision {
    Received,
    Approved,
    Rejected { reason: String },
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error("{0}")]
    Validation(FormErrors),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("you do not have access to this application")]
    Forbidden,
    #[error("an active application ({0}) already exists")]
    ActiveApplicationExists(ApplicationId),
    #[error("cannot {action} an application that is {}", .from.label())]
    InvalidTransition {
        from: ApplicationStatus,
        action: &'static str,
    },
    #[error("application is missing: {}", .0.join(", "))]
    NotReady(Vec<&'static str>),
    #[error("no medical provider is recorded for this application")]
    MissingMedicalProvider,
    #[error("{0} is not an evaluator")]
    InvalidEvaluator(UserId),
    #[error(transparent)]
    Voucher(#[from] VoucherError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Service object for the constituent application lifecycle.
pub struct ApplicationService {
    applications: Arc<dyn ApplicationRepository>,
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventLog>,
    notifications: Arc<NotificationService>,
    vouchers: Arc<VoucherService>,
    evaluations: Arc<EvaluationService>,
    threshold: IncomeThreshold,
}

impl ApplicationService {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        users: Arc<dyn UserRepository>,
        events: Arc<dyn EventLog>,
        notifications: Arc<NotificationService>,
        vouchers: Arc<VoucherService>,
        evaluations: Arc<EvaluationService>,
        threshold: IncomeThreshold,
    ) -> Self {
        Self {
            applications,
            users,
            events,
            notifications,
            vouchers,
            evaluations,
            threshold,
        }
    }

    pub fn threshold(&self) -> &IncomeThreshold {
        &self.threshold
    }

    /// Start a new application, either as a draft or submitted straight away.
    pub fn create(
        &self,
        constituent: &User,
        form: ApplicationForm,
        now: DateTime<Utc>,
    ) -> Result<Application, ApplicationServiceError> {
        let validated = form
            .validate(&self.threshold)
            .map_err(ApplicationServiceError::Validation)?;

        if let Some(active) = self.active_for_user(&constituent.id)? {
            return Err(ApplicationServiceError::ActiveApplicationExists(active.id));
        }

        let mut application = Application {
            id: next_application_id(),
            user_id: constituent.id.clone(),
            status: ApplicationStatus::Draft,
            household_size: 0,
            annual_income_cents: 0,
            maryland_resident: false,
            self_certified: false,
            disabilities: Default::default(),
            medical_provider: None,
            income_proof: ProofStatus::NotSubmitted,
            residency_proof: ProofStatus::NotSubmitted,
            medical_certification: MedicalCertificationStatus::NotRequested,
            evaluator_id: None,
            rejection_count: 0,
            status_reason: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        };
        let submitted = apply(&mut application, validated, now);

        let stored = match self.applications.insert_application(application) {
            Ok(stored) => stored,
            // Another request created one between the check above and the insert.
            Err(RepositoryError::Conflict) => {
                return Err(match self.active_for_user(&constituent.id)? {
                    Some(active) => ApplicationServiceError::ActiveApplicationExists(active.id),
                    None => RepositoryError::Conflict.into(),
                })
            }
            Err(other) => return Err(other.into()),
        };
        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&constituent.id),
                "application_created",
                "application",
                &stored.id.0,
                json!({ "status": stored.status.label() }),
                now,
            ),
        );
        if submitted {
            self.announce_submission(&stored, now);
        }
        Ok(stored)
    }

    /// Edit a draft; submitting moves it into review.
    pub fn update(
        &self,
        constituent: &User,
        id: &ApplicationId,
        form: ApplicationForm,
        now: DateTime<Utc>,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch(id)?;
        if current.user_id != constituent.id {
            return Err(ApplicationServiceError::Forbidden);
        }
        if current.status != ApplicationStatus::Draft {
            return Err(ApplicationServiceError::InvalidTransition {
                from: current.status,
                action: "edit",
            });
        }

        let validated = form
            .validate(&self.threshold)
            .map_err(ApplicationServiceError::Validation)?;
        let mut application = current.clone();
        let submitted = apply(&mut application, validated, now);
        self.applications
            .update_application(&current, application.clone())?;

        if submitted {
            self.announce_submission(&application, now);
        }
        Ok(application)
    }

    pub fn get(
        &self,
        actor: &User,
        id: &ApplicationId,
    ) -> Result<Application, ApplicationServiceError> {
        let application = self.fetch(id)?;
        if !application.is_visible_to(actor) {
            return Err(ApplicationServiceError::Forbidden);
        }
        Ok(application)
    }

    /// Unscoped lookup for system callers such as the provider mailbox.
    pub fn find(&self, id: &ApplicationId) -> Result<Application, ApplicationServiceError> {
        self.fetch(id)
    }

    pub fn list_by_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<Application>, ApplicationServiceError> {
        let mut applications = self.applications.applications_with_status(status)?;
        applications.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(applications)
    }

    pub fn for_user(&self, user_id: &UserId) -> Result<Vec<Application>, ApplicationServiceError> {
        Ok(self.applications.applications_for_user(user_id)?)
    }

    /// The constituent's current (non-archived, non-rejected) application, if any.
    pub fn active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Application>, ApplicationServiceError> {
        Ok(self
            .applications
            .applications_for_user(user_id)?
            .into_iter()
            .filter(|application| application.status.is_active())
            .max_by_key(|application| application.created_at))
    }

    pub fn request_medical_certification(
        &self,
        admin: &User,
        id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch(id)?;
        require_under_review(&current, "request certification for")?;
        let provider = current
            .medical_provider
            .clone()
            .ok_or(ApplicationServiceError::MissingMedicalProvider)?;
        if current.medical_certification == MedicalCertificationStatus::Approved {
            return Err(ApplicationServiceError::InvalidTransition {
                from: current.status,
                action: "re-request certification for",
            });
        }

        let mut application = current.clone();
        application.medical_certification = MedicalCertificationStatus::Requested;
        application.updated_at = now;
        self.applications
            .update_application(&current, application.clone())?;

        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&admin.id),
                "medical_certification_requested",
                "application",
                &application.id.0,
                json!({ "provider": provider.name, "provider_fax": provider.fax, "provider_email": provider.email }),
                now,
            ),
        );
        self.notifications.dispatch(
            &application.user_id,
            Some(&admin.id),
            NotificationAction::MedicalCertificationRequested {
                application_id: application.id.0.clone(),
                provider_name: provider.name,
            },
            now,
        );
        Ok(application)
    }

    pub fn record_medical_certification(
        &self,
        actor_id: Option<&UserId>,
        id: &ApplicationId,
        decision: CertificationDecision,
        now: DateTime<Utc>,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch(id)?;
        require_under_review(&current, "certify")?;

        let next = match (&decision, current.medical_certification) {
            (CertificationDecision::Received, MedicalCertificationStatus::Approved) => None,
            (CertificationDecision::Received, _) => Some(MedicalCertificationStatus::Received),
            (CertificationDecision::Approved, MedicalCertificationStatus::Received) => {
                Some(MedicalCertificationStatus::Approved)
            }
            (CertificationDecision::Rejected { .. }, MedicalCertificationStatus::Received) => {
                Some(MedicalCertificationStatus::Rejected)
            }
            _ => None,
        };
        let Some(next) = next else {
            return Err(ApplicationServiceError::InvalidTransition {
                from: current.status,
                action: "record this certification decision for",
            });
        };

        let mut application = current.clone();
        application.medical_certification = next;
        application.updated_at = now;
        self.applications
            .update_application(&current, application.clone())?;

        audit::record(
            self.events.as_ref(),
            Event::new(
                actor_id,
                "medical_certification_updated",
                "application",
                &application.id.0,
                json!({ "decision": decision }),
                now,
            ),
        );
        if let CertificationDecision::Rejected { reason } = decision {
            self.notifications.dispatch(
                &application.user_id,
                actor_id,
                NotificationAction::MedicalCertificationRejected {
                    application_id: application.id.0.clone(),
                    reason,
                },
                now,
            );
        }
        Ok(application)
    }

    /// Approve once both proofs and the medical certification are approved; issues the voucher.
    pub fn approve(
        &self,
        admin: &User,
        id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<(Application, Voucher), ApplicationServiceError> {
        let current = self.fetch(id)?;
        require_under_review(&current, "approve")?;
        let missing = current.outstanding_requirements();
        if !missing.is_empty() {
            return Err(ApplicationServiceError::NotReady(missing));
        }

        let mut application = current.clone();
        application.status = ApplicationStatus::Approved;
        application.status_reason = None;
        application.updated_at = now;

        // Only the caller whose status change lands goes on to issue a voucher.
        self.applications
            .update_application(&current, application.clone())?;
        let voucher = match self.vouchers.issue(Some(&admin.id), &application, now) {
            Ok(voucher) => voucher,
            Err(err) => {
                if let Err(revert) = self
                    .applications
                    .update_application(&application, current)
                {
                    warn!(
                        application = %application.id,
                        error = %revert,
                        "could not revert approval after voucher failure"
                    );
                }
                return Err(err.into());
            }
        };

        info!(application = %application.id, voucher = %voucher.code.0, "application approved");
        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&admin.id),
                "application_approved",
                "application",
                &application.id.0,
                json!({ "voucher": voucher.code.0 }),
                now,
            ),
        );
        self.notifications.dispatch(
            &application.user_id,
            Some(&admin.id),
            NotificationAction::ApplicationApproved {
                application_id: application.id.0.clone(),
            },
            now,
        );
        Ok((application, voucher))
    }

    pub fn reject(
        &self,
        admin: &User,
        id: &ApplicationId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch(id)?;
        require_under_review(&current, "reject")?;

        let mut application = current.clone();
        application.status = ApplicationStatus::Rejected;
        application.status_reason = Some(reason.clone());
        application.updated_at = now;
        self.applications
            .update_application(&current, application.clone())?;

        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&admin.id),
                "application_rejected",
                "application",
                &application.id.0,
                json!({ "reason": reason }),
                now,
            ),
        );
        self.notifications.dispatch(
            &application.user_id,
            Some(&admin.id),
            NotificationAction::ApplicationRejected {
                application_id: application.id.0.clone(),
                reason,
            },
            now,
        );
        Ok(application)
    }

    /// Close an application that never reached a decision.
    pub fn archive(
        &self,
        actor_id: Option<&UserId>,
        id: &ApplicationId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch(id)?;
        if !matches!(
            current.status,
            ApplicationStatus::Draft
                | ApplicationStatus::InProgress
                | ApplicationStatus::NeedsInformation
        ) {
            return Err(ApplicationServiceError::InvalidTransition {
                from: current.status,
                action: "archive",
            });
        }

        let mut application = current.clone();
        archive_in_place(&mut application, &reason, now);
        self.applications
            .update_application(&current, application.clone())?;
        self.announce_archive(actor_id, &application, reason, now);
        Ok(application)
    }

    pub fn assign_evaluator(
        &self,
        admin: &User,
        id: &ApplicationId,
        evaluator_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(Application, Evaluation), ApplicationServiceError> {
        let current = self.fetch(id)?;
        if current.status != ApplicationStatus::Approved {
            return Err(ApplicationServiceError::InvalidTransition {
                from: current.status,
                action: "assign an evaluator to",
            });
        }
        let evaluator = self
            .users
            .fetch_user(evaluator_id)?
            .filter(|user| user.role == UserRole::Evaluator)
            .ok_or_else(|| ApplicationServiceError::InvalidEvaluator(evaluator_id.clone()))?;

        let evaluation = self
            .evaluations
            .request(&admin.id, &current, &evaluator, now)?;
        let mut application = current.clone();
        application.evaluator_id = Some(evaluator.id.clone());
        application.updated_at = now;
        self.applications
            .update_application(&current, application.clone())?;

        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&admin.id),
                "evaluator_assigned",
                "application",
                &application.id.0,
                json!({ "evaluator": evaluator.id.0, "evaluation": evaluation.id.0 }),
                now,
            ),
        );
        Ok((application, evaluation))
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Application, ApplicationServiceError> {
        self.applications
            .fetch_application(id)?
            .ok_or_else(|| ApplicationServiceError::NotFound(id.clone()))
    }

    fn announce_submission(&self, application: &Application, now: DateTime<Utc>) {
        info!(application = %application.id, user = %application.user_id, "application submitted");
        audit::record(
            self.events.as_ref(),
            Event::new(
                Some(&application.user_id),
                "application_submitted",
                "application",
                &application.id.0,
                json!({
                    "household_size": application.household_size,
                    "annual_income_cents": application.annual_income_cents,
                }),
                now,
            ),
        );
        self.notifications.dispatch(
            &application.user_id,
            None,
            NotificationAction::ApplicationSubmitted {
                application_id: application.id.0.clone(),
            },
            now,
        );
    }

    pub(crate) fn announce_archive(
        &self,
        actor_id: Option<&UserId>,
        application: &Application,
        reason: String,
        now: DateTime<Utc>,
    ) {
        audit::record(
            self.events.as_ref(),
            Event::new(
                actor_id,
                "application_archived",
                "application",
                &application.id.0,
                json!({ "reason": reason }),
                now,
            ),
        );
        self.notifications.dispatch(
            &application.user_id,
            actor_id,
            NotificationAction::ApplicationArchived {
                application_id: application.id.0.clone(),
                reason,
            },
            now,
        );
    }
}

/// Copy validated values onto the record. Returns true when this call submitted it.
fn apply(application: &mut Application, validated: ValidatedApplication, now: DateTime<Utc>) -> bool {
    application.household_size = validated.household_size;
    application.annual_income_cents = validated.annual_income_cents;
    application.disabilities = validated.disabilities;
    application.maryland_resident = validated.maryland_resident;
    application.self_certified = validated.self_certified;
    application.medical_provider = validated.medical_provider;
    application.updated_at = now;

    if validated.intent == SubmissionIntent::Submit {
        application.status = ApplicationStatus::InProgress;
        application.submitted_at = Some(now);
        true
    } else {
        false
    }
}

pub(crate) fn archive_in_place(application: &mut Application, reason: &str, now: DateTime<Utc>) {
    application.status = ApplicationStatus::Archived;
    application.status_reason = Some(reason.to_string());
    application.updated_at = now;
}

fn require_under_review(
    application: &Application,
    action: &'static str,
) -> Result<(), ApplicationServiceError> {
    if application.status.is_under_review() {
        Ok(())
    } else {
        Err(ApplicationServiceError::InvalidTransition {
            from: application.status,
            action,
        })
    }
}
