use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use super::domain::{BillingPeriod, Invoice, InvoiceDraft, InvoiceId, InvoiceStatus};
use super::export;
use super::repository::InvoiceRepository;
use crate::store::RepositoryError;
use crate::workflows::accounts::{User, UserId, UserRepository, UserRole};
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::notifications::{NotificationAction, NotificationService};
use crate::workflows::sequence::Sequence;

static INVOICE_SEQUENCE: Sequence = Sequence::new("inv");

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("invoice {0} not found")]
    NotFound(InvoiceId),
    #[error("{0} is not an approved vendor")]
    NotAVendor(UserId),
    #[error("cannot {action} an invoice that is {}", .from.label())]
    InvalidTransition {
        from: InvoiceStatus,
        action: &'static str,
    },
    #[error("check number can't be blank")]
    MissingCheckNumber,
    #[error("failed to render invoice export: {0}")]
    Export(#[from] csv::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct InvoiceService {
    invoices: Arc<dyn InvoiceRepository>,
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventLog>,
    notifications: Arc<NotificationService>,
}

impl InvoiceService {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        users: Arc<dyn UserRepository>,
        events: Arc<dyn EventLog>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            invoices,
            users,
            events,
            notifications,
        }
    }

    /// Invoice the vendor's uninvoiced redemptions in `period`. `None` when there are none.
    pub fn generate_for_vendor(
        &self,
        actor_id: Option<&UserId>,
        vendor: &User,
        period: BillingPeriod,
        now: DateTime<Utc>,
    ) -> Result<Option<Invoice>, InvoiceError> {
        if !vendor.is_approved_vendor() {
            return Err(InvoiceError::NotAVendor(vendor.id.clone()));
        }
        let draft = InvoiceDraft {
            id: InvoiceId(INVOICE_SEQUENCE.next_id()),
            vendor_id: vendor.id.clone(),
            period,
            number_prefix: format!("INV-{}", now.format("%Y%m")),
            created_at: now,
        };
        let Some(invoice) = self.invoices.create_invoice(draft)? else {
            return Ok(None);
        };

        info!(
            invoice = %invoice.number,
            vendor = %vendor.id,
            transactions = invoice.transaction_ids.len(),
            total_cents = invoice.total_cents,
            "invoice generated"
        );
        self.record(
            actor_id,
            "invoice_generated",
            &invoice,
            json!({
                "transactions": invoice.transaction_ids.len(),
                "total_cents": invoice.total_cents,
            }),
            now,
        );
        Ok(Some(invoice))
    }

    /// Run [`Self::generate_for_vendor`] for every approved vendor.
    pub fn generate_all(
        &self,
        actor_id: Option<&UserId>,
        period: BillingPeriod,
        now: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, InvoiceError> {
        let mut generated = Vec::new();
        for vendor in self
            .users
            .users_with_role(UserRole::Vendor)?
            .into_iter()
            .filter(User::is_approved_vendor)
        {
            if let Some(invoice) = self.generate_for_vendor(actor_id, &vendor, period, now)? {
                generated.push(invoice);
            }
        }
        Ok(generated)
    }

    pub fn get(&self, id: &InvoiceId) -> Result<Invoice, InvoiceError> {
        self.invoices
            .fetch_invoice(id)?
            .ok_or_else(|| InvoiceError::NotFound(id.clone()))
    }

    pub fn for_vendor(&self, vendor_id: &UserId) -> Result<Vec<Invoice>, InvoiceError> {
        Ok(self.invoices.invoices_for_vendor(vendor_id)?)
    }

    pub fn approve(
        &self,
        admin: &User,
        id: &InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, InvoiceError> {
        let current = self.get(id)?;
        if current.status != InvoiceStatus::Pending {
            return Err(InvoiceError::InvalidTransition {
                from: current.status,
                action: "approve",
            });
        }
        let mut invoice = current.clone();
        invoice.status = InvoiceStatus::Approved;
        invoice.updated_at = now;
        self.invoices.update_invoice(&current, invoice.clone())?;
        self.record(Some(&admin.id), "invoice_approved", &invoice, json!({}), now);
        Ok(invoice)
    }

    pub fn record_payment(
        &self,
        admin: &User,
        id: &InvoiceId,
        check_number: String,
        now: DateTime<Utc>,
    ) -> Result<Invoice, InvoiceError> {
        let check_number = check_number.trim().to_string();
        if check_number.is_empty() {
            return Err(InvoiceError::MissingCheckNumber);
        }
        let current = self.get(id)?;
        if current.status != InvoiceStatus::Approved {
            return Err(InvoiceError::InvalidTransition {
                from: current.status,
                action: "pay",
            });
        }
        let mut invoice = current.clone();
        invoice.status = InvoiceStatus::Paid;
        invoice.check_number = Some(check_number.clone());
        invoice.paid_at = Some(now);
        invoice.updated_at = now;
        self.invoices.update_invoice(&current, invoice.clone())?;

        info!(invoice = %invoice.number, check = %check_number, "invoice paid");
        self.record(
            Some(&admin.id),
            "invoice_paid",
            &invoice,
            json!({ "check_number": check_number }),
            now,
        );
        self.notifications.dispatch(
            &invoice.vendor_id,
            Some(&admin.id),
            NotificationAction::InvoicePaid {
                invoice_number: invoice.number.clone(),
                total_cents: invoice.total_cents,
                check_number,
            },
            now,
        );
        Ok(invoice)
    }

    /// Cancel an unpaid invoice; its transactions become billable again.
    pub fn cancel(
        &self,
        admin: &User,
        id: &InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, InvoiceError> {
        let current = self.get(id)?;
        if !matches!(current.status, InvoiceStatus::Pending | InvoiceStatus::Approved) {
            return Err(InvoiceError::InvalidTransition {
                from: current.status,
                action: "cancel",
            });
        }
        let mut invoice = current.clone();
        invoice.status = InvoiceStatus::Cancelled;
        invoice.updated_at = now;
        self.invoices.release_invoice(&current, invoice.clone())?;
        self.record(
            Some(&admin.id),
            "invoice_cancelled",
            &invoice,
            json!({ "released": invoice.transaction_ids.len() }),
            now,
        );
        Ok(invoice)
    }

    pub fn export_csv(&self, id: &InvoiceId) -> Result<(Invoice, Vec<u8>), InvoiceError> {
        let invoice = self.get(id)?;
        let mut transactions = self.invoices.transactions_for_invoice(id)?;
        transactions.sort_by(|left, right| left.processed_at.cmp(&right.processed_at));
        let body = export::invoice_csv(&invoice, &transactions)?;
        Ok((invoice, body))
    }

    fn record(
        &self,
        actor_id: Option<&UserId>,
        action: &str,
        invoice: &Invoice,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        audit::record(
            self.events.as_ref(),
            Event::new(actor_id, action, "invoice", &invoice.id.0, metadata, now),
        );
    }
}
