use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflows::accounts::UserId;
use crate::workflows::applications::ApplicationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    Income,
    Residency,
}

impl ProofType {
    pub const fn label(self) -> &'static str {
        match self {
            ProofType::Income => "income",
            ProofType::Residency => "residency",
        }
    }
}

impl FromStr for ProofType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(ProofType::Income),
            "residency" => Ok(ProofType::Residency),
            other => Err(format!("unknown proof type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    #[default]
    NotSubmitted,
    Submitted,
    Approved,
    Rejected,
}

impl ProofStatus {
    /// A new document is only accepted when nothing is pending review or already approved.
    pub const fn accepts_submission(self) -> bool {
        matches!(self, ProofStatus::NotSubmitted | ProofStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionChannel {
    Web,
    Email,
}

/// Validated metadata for a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofAttachment {
    pub filename: String,
    pub content_type: String,
    pub byte_size: usize,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub id: String,
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub proof_type: ProofType,
    pub channel: SubmissionChannel,
    pub attachment: ProofAttachment,
    pub submitted_at: DateTime<Utc>,
}

/// Audit row written for every accepted submission; rate limits are counted from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofSubmissionAudit {
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub proof_type: ProofType,
    pub channel: SubmissionChannel,
    pub submitted_at: DateTime<Utc>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    AddressMismatch,
    Expired,
    MissingName,
    WrongDocument,
    MissingAmount,
    ExceedsThreshold,
    Other(String),
}

impl RejectionReason {
    pub fn description(&self) -> String {
        match self {
            RejectionReason::AddressMismatch => {
                "The address on the document does not match the application".to_string()
            }
            RejectionReason::Expired => "The document has expired".to_string(),
            RejectionReason::MissingName => "The document does not show your name".to_string(),
            RejectionReason::WrongDocument => {
                "The document is not an accepted proof type".to_string()
            }
            RejectionReason::MissingAmount => "The document does not show an income amount".to_string(),
            RejectionReason::ExceedsThreshold => {
                "The income shown exceeds the program limit".to_string()
            }
            RejectionReason::Other(detail) => detail.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected(RejectionReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofReview {
    pub application_id: ApplicationId,
    pub proof_type: ProofType,
    pub admin_id: UserId,
    pub decision: ReviewDecision,
    pub reviewed_at: DateTime<Utc>,
}
