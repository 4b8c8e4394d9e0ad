use chrono::{DateTime, Utc};

use super::domain::{ProofReview, ProofSubmission, ProofSubmissionAudit};
use super::rate_limit::{ProofRateLimiter, RateLimitExceeded};
use crate::store::RepositoryError;
use crate::workflows::accounts::UserId;
use crate::workflows::applications::{Application, ApplicationId};

/// Rows written for one accepted submission.
#[derive(Debug, Clone)]
pub struct SubmissionWrite {
    /// Application as read before the submission; the write is refused if it changed since.
    pub current: Application,
    pub updated: Application,
    pub submission: ProofSubmission,
    pub audit: ProofSubmissionAudit,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionWriteError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub trait ProofRepository: Send + Sync {
    /// Check `limiter` against the submitter's audit trail, then store the application, the
    /// submission and its audit row, all in one step.
    fn record_submission(
        &self,
        write: SubmissionWrite,
        limiter: &ProofRateLimiter,
    ) -> Result<(), SubmissionWriteError>;
    fn audits_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProofSubmissionAudit>, RepositoryError>;
    fn submissions_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ProofSubmission>, RepositoryError>;
    /// Store the reviewed application and the review together. Fails with `Conflict` when the
    /// stored application no longer equals `current`.
    fn record_review(
        &self,
        current: &Application,
        updated: Application,
        review: ProofReview,
    ) -> Result<(), RepositoryError>;
    fn reviews_for(&self, application_id: &ApplicationId)
        -> Result<Vec<ProofReview>, RepositoryError>;
}
