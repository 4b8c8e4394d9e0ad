use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::accounts::{User, UserId, UserRole};
use crate::workflows::proofs::{ProofStatus, ProofType};

/// Identifier wrapper for constituent applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    InProgress,
    NeedsInformation,
    Approved,
    Rejected,
    Archived,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::NeedsInformation => "needs_information",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Archived => "archived",
        }
    }

    /// A constituent may hold only one active application at a time.
    pub const fn is_active(self) -> bool {
        !matches!(self, ApplicationStatus::Rejected | ApplicationStatus::Archived)
    }

    /// Submitted and awaiting an administrator decision.
    pub const fn is_under_review(self) -> bool {
        matches!(
            self,
            ApplicationStatus::InProgress | ApplicationStatus::NeedsInformation
        )
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "draft" => Ok(ApplicationStatus::Draft),
            "in_progress" => Ok(ApplicationStatus::InProgress),
            "needs_information" => Ok(ApplicationStatus::NeedsInformation),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "archived" => Ok(ApplicationStatus::Archived),
            other => Err(format!("unknown application status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabilityKind {
    Hearing,
    Vision,
    Speech,
    Mobility,
    Cognition,
}

impl FromStr for DisabilityKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hearing" => Ok(DisabilityKind::Hearing),
            "vision" => Ok(DisabilityKind::Vision),
            "speech" => Ok(DisabilityKind::Speech),
            "mobility" => Ok(DisabilityKind::Mobility),
            "cognition" => Ok(DisabilityKind::Cognition),
            other => Err(format!("'{other}' is not a recognized disability")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicalCertificationStatus {
    #[default]
    NotRequested,
    Requested,
    Received,
    Approved,
    Rejected,
}

/// Certifying professional named on the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalProvider {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub status: ApplicationStatus,
    pub household_size: u32,
    pub annual_income_cents: u64,
    pub maryland_resident: bool,
    pub self_certified: bool,
    pub disabilities: BTreeSet<DisabilityKind>,
    pub medical_provider: Option<MedicalProvider>,
    pub income_proof: ProofStatus,
    pub residency_proof: ProofStatus,
    pub medical_certification: MedicalCertificationStatus,
    pub evaluator_id: Option<UserId>,
    pub rejection_count: u32,
    pub status_reason: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn proof_status(&self, proof_type: ProofType) -> ProofStatus {
        match proof_type {
            ProofType::Income => self.income_proof,
            ProofType::Residency => self.residency_proof,
        }
    }

    pub fn set_proof_status(&mut self, proof_type: ProofType, status: ProofStatus) {
        match proof_type {
            ProofType::Income => self.income_proof = status,
            ProofType::Residency => self.residency_proof = status,
        }
    }

    /// Requirements still open before the application can be approved.
    pub fn outstanding_requirements(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.income_proof != ProofStatus::Approved {
            missing.push("income proof");
        }
        if self.residency_proof != ProofStatus::Approved {
            missing.push("residency proof");
        }
        if self.medical_certification != MedicalCertificationStatus::Approved {
            missing.push("medical certification");
        }
        missing
    }

    /// Owners see their own applications; staff see everything, evaluators only their assignments.
    pub fn is_visible_to(&self, user: &User) -> bool {
        match user.role {
            UserRole::Administrator => true,
            UserRole::Constituent => self.user_id == user.id,
            UserRole::Evaluator => self.evaluator_id.as_ref() == Some(&user.id),
            UserRole::Vendor | UserRole::Trainer => false,
        }
    }
}
