use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::accounts::{CommunicationPreference, UserId};
use crate::workflows::proofs::ProofType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Email,
    Fax,
    Letter,
}

impl From<CommunicationPreference> for DeliveryMethod {
    fn from(value: CommunicationPreference) -> Self {
        match value {
            CommunicationPreference::Email => DeliveryMethod::Email,
            CommunicationPreference::Fax => DeliveryMethod::Fax,
            CommunicationPreference::Letter => DeliveryMethod::Letter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Opened,
    Failed,
    Bounced,
}

impl DeliveryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DeliveryStatus::Queued => "queued",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Opened => "opened",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Bounced => "bounced",
        }
    }

    /// Provider callbacks arrive out of order; a status never moves backwards.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, next) {
            (Queued, Sent | Delivered | Opened | Failed | Bounced) => true,
            (Sent, Delivered | Opened | Failed | Bounced) => true,
            (Delivered, Opened | Bounced) => true,
            _ => false,
        }
    }
}

/// What happened, with the details each message template needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationAction {
    ApplicationSubmitted {
        application_id: String,
    },
    ApplicationApproved {
        application_id: String,
    },
    ApplicationRejected {
        application_id: String,
        reason: String,
    },
    ApplicationArchived {
        application_id: String,
        reason: String,
    },
    ProofApproved {
        application_id: String,
        proof_type: ProofType,
    },
    ProofRejected {
        application_id: String,
        proof_type: ProofType,
        reason: String,
    },
    MedicalCertificationRequested {
        application_id: String,
        provider_name: String,
    },
    MedicalCertificationRejected {
        application_id: String,
        reason: String,
    },
    EvaluationScheduled {
        evaluation_id: String,
        scheduled_for: DateTime<Utc>,
        location: String,
    },
    EvaluationCompleted {
        evaluation_id: String,
        recommended_products: Vec<String>,
    },
    VoucherIssued {
        code: String,
        value_cents: u64,
        expires_at: DateTime<Utc>,
    },
    VoucherRedeemed {
        code: String,
        amount_cents: u64,
        remaining_cents: u64,
    },
    VoucherExpiring {
        code: String,
        remaining_cents: u64,
        expires_at: DateTime<Utc>,
    },
    VoucherExpired {
        code: String,
    },
    VoucherCancelled {
        code: String,
        reason: String,
    },
    InvoicePaid {
        invoice_number: String,
        total_cents: u64,
        check_number: String,
    },
    PasswordReset {
        #[serde(skip_serializing, default)]
        token: String,
        expires_at: DateTime<Utc>,
    },
    InboundEmailBounced {
        subject: String,
        reason: String,
    },
}

impl NotificationAction {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::ApplicationSubmitted { .. } => "application_submitted",
            NotificationAction::ApplicationApproved { .. } => "application_approved",
            NotificationAction::ApplicationRejected { .. } => "application_rejected",
            NotificationAction::ApplicationArchived { .. } => "application_archived",
            NotificationAction::ProofApproved { .. } => "proof_approved",
            NotificationAction::ProofRejected { .. } => "proof_rejected",
            NotificationAction::MedicalCertificationRequested { .. } => {
                "medical_certification_requested"
            }
            NotificationAction::MedicalCertificationRejected { .. } => {
                "medical_certification_rejected"
            }
            NotificationAction::EvaluationScheduled { .. } => "evaluation_scheduled",
            NotificationAction::EvaluationCompleted { .. } => "evaluation_completed",
            NotificationAction::VoucherIssued { .. } => "voucher_issued",
            NotificationAction::VoucherRedeemed { .. } => "voucher_redeemed",
            NotificationAction::VoucherExpiring { .. } => "voucher_expiring",
            NotificationAction::VoucherExpired { .. } => "voucher_expired",
            NotificationAction::VoucherCancelled { .. } => "voucher_cancelled",
            NotificationAction::InvoicePaid { .. } => "invoice_paid",
            NotificationAction::PasswordReset { .. } => "password_reset",
            NotificationAction::InboundEmailBounced { .. } => "inbound_email_bounced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub actor_id: Option<UserId>,
    pub action: NotificationAction,
    pub delivery_method: DeliveryMethod,
    pub delivery_status: DeliveryStatus,
    pub message_id: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
