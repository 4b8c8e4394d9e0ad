use super::domain::NotificationAction;
use crate::workflows::accounts::User;
use crate::workflows::money::format_cents;

const PROGRAM_NAME: &str = "Assistive Technology Voucher Program";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Render the subject and body for `action`, addressed to `recipient`.
pub fn render(action: &NotificationAction, recipient: &User) -> RenderedMessage {
    let (subject, detail) = match action {
        NotificationAction::ApplicationSubmitted { application_id } => (
            "We received your application".to_string(),
            format!(
                "Your application {application_id} has been submitted. Please upload proof of income and residency so we can review it."
            ),
        ),
        NotificationAction::ApplicationApproved { application_id } => (
            "Your application has been approved".to_string(),
            format!("Application {application_id} has been approved. Your voucher details follow in a separate message."),
        ),
        NotificationAction::ApplicationRejected {
            application_id,
            reason,
        } => (
            "Update on your application".to_string(),
            format!("Application {application_id} was not approved: {reason}"),
        ),
        NotificationAction::ApplicationArchived {
            application_id,
            reason,
        } => (
            "Your application has been closed".to_string(),
            format!("Application {application_id} was archived: {reason}. You may submit a new application."),
        ),
        NotificationAction::ProofApproved {
            application_id,
            proof_type,
        } => (
            format!("Your {} proof was approved", proof_type.label()),
            format!(
                "We reviewed the {} document for application {application_id} and approved it.",
                proof_type.label()
            ),
        ),
        NotificationAction::ProofRejected {
            application_id,
            proof_type,
            reason,
        } => (
            format!("Action needed: {} proof", proof_type.label()),
            format!(
                "We could not accept the {} document for application {application_id}: {reason}. Please submit a new document online or reply to this message with an attachment.",
                proof_type.label()
            ),
        ),
        NotificationAction::MedicalCertificationRequested {
            application_id,
            provider_name,
        } => (
            "Medical certification requested".to_string(),
            format!("We asked {provider_name} to certify your disability for application {application_id}."),
        ),
        NotificationAction::MedicalCertificationRejected {
            application_id,
            reason,
        } => (
            "Medical certification needs attention".to_string(),
            format!("The medical certification for application {application_id} was not accepted: {reason}"),
        ),
        NotificationAction::EvaluationScheduled {
            evaluation_id,
            scheduled_for,
            location,
        } => (
            "Your evaluation is scheduled".to_string(),
            format!(
                "Evaluation {evaluation_id} is scheduled for {} at {location}.",
                scheduled_for.format("%B %-d, %Y %H:%M UTC")
            ),
        ),
        NotificationAction::EvaluationCompleted {
            evaluation_id,
            recommended_products,
        } => (
            "Your evaluation is complete".to_string(),
            format!(
                "Evaluation {evaluation_id} is complete. Recommended products: {}.",
                recommended_products.join(", ")
            ),
        ),
        NotificationAction::VoucherIssued {
            code,
            value_cents,
            expires_at,
        } => (
            "Your voucher is ready".to_string(),
            format!(
                "Voucher {code} for {} has been issued. It expires on {}.",
                format_cents(*value_cents),
                expires_at.format("%B %-d, %Y")
            ),
        ),
        NotificationAction::VoucherRedeemed {
            code,
            amount_cents,
            remaining_cents,
        } => (
            "Voucher purchase recorded".to_string(),
            format!(
                "{} was redeemed from voucher {code}. Remaining balance: {}.",
                format_cents(*amount_cents),
                format_cents(*remaining_cents)
            ),
        ),
        NotificationAction::VoucherExpiring {
            code,
            remaining_cents,
            expires_at,
        } => (
            "Your voucher expires soon".to_string(),
            format!(
                "Voucher {code} still has {} available and expires on {}.",
                format_cents(*remaining_cents),
                expires_at.format("%B %-d, %Y")
            ),
        ),
        NotificationAction::VoucherExpired { code } => (
            "Your voucher has expired".to_string(),
            format!("Voucher {code} has expired and can no longer be used."),
        ),
        NotificationAction::VoucherCancelled { code, reason } => (
            "Your voucher was cancelled".to_string(),
            format!("Voucher {code} was cancelled: {reason}"),
        ),
        NotificationAction::InvoicePaid {
            invoice_number,
            total_cents,
            check_number,
        } => (
            format!("Payment issued for invoice {invoice_number}"),
            format!(
                "Invoice {invoice_number} for {} was paid with check {check_number}.",
                format_cents(*total_cents)
            ),
        ),
        NotificationAction::PasswordReset { token, expires_at } => (
            "Reset your password".to_string(),
            format!(
                "Use this code to reset your password: {token}. It expires at {}.",
                expires_at.format("%H:%M UTC on %B %-d, %Y")
            ),
        ),
        NotificationAction::InboundEmailBounced { subject, reason } => (
            "We could not process your email".to_string(),
            format!("Your message \"{subject}\" was not processed: {reason}"),
        ),
    };

    RenderedMessage {
        subject: format!("{PROGRAM_NAME}: {subject}"),
        body: format!("Dear {},\n\n{detail}\n\n{PROGRAM_NAME}", recipient.full_name()),
    }
}
