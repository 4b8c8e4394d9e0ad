//! Proof-of-eligibility documents: intake from web and email, rate limiting, and review.

pub mod attachment;
pub mod domain;
pub mod rate_limit;
pub mod repository;
pub(crate) mod router;
pub mod service;

pub use attachment::{AttachmentError, DocumentStore, UploadedDocument, MAX_ATTACHMENT_BYTES};
pub use domain::{
    ProofAttachment, ProofReview, ProofStatus, ProofSubmission, ProofSubmissionAudit, ProofType,
    RejectionReason, ReviewDecision, SubmissionChannel,
};
pub use rate_limit::{ProofRateLimiter, RateLimitExceeded};
pub use repository::{ProofRepository, SubmissionWrite, SubmissionWriteError};
pub use service::{ProofError, ProofService};
