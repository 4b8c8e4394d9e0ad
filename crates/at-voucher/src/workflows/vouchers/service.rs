use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::code;
use super::domain::{
    RedemptionRequest, TransactionId, Voucher, VoucherCode, VoucherLookup, VoucherStatus,
    VoucherTransaction,
};
use super::repository::VoucherRepository;
use crate::config::ProgramConfig;
use crate::store::RepositoryError;
use crate::workflows::accounts::{User, UserId, UserRepository};
use crate::workflows::applications::{Application, DisabilityKind};
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::money::format_cents;
use crate::workflows::notifications::{NotificationAction, NotificationService};
use crate::workflows::sequence::Sequence;

static TRANSACTION_SEQUENCE: Sequence = Sequence::new("txn");

const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum VoucherError {
    #[error("voucher {0} not found")]
    NotFound(VoucherCode),
    #[error("vendor account is not approved to redeem vouchers")]
    VendorNotApproved,
    #[error("voucher is {} and cannot be {action}", .status.label())]
    NotActive {
        status: VoucherStatus,
        action: &'static str,
    },
    #[error("voucher expired on {}", .0.format("%Y-%m-%d"))]
    Expired(DateTime<Utc>),
    #[error("redemption amount must be greater than zero")]
    ZeroAmount,
    #[error("amount exceeds the remaining balance of {}", format_cents(*.0))]
    InsufficientBalance(u64),
    #[error("redemptions must be at least {} unless they use the full balance", format_cents(*.0))]
    BelowMinimum(u64),
    #[error("application has no disabilities with a configured voucher value")]
    NoValue,
    #[error("could not allocate a unique voucher code")]
    CodeExhausted,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Issuance and redemption rules taken from [`ProgramConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherPolicy {
    pub validity_months: u32,
    pub minimum_redemption_cents: u64,
    pub expiry_warning_days: i64,
    pub values_cents: BTreeMap<DisabilityKind, u64>,
}

impl VoucherPolicy {
    pub fn from_config(config: &ProgramConfig) -> Self {
        Self {
            validity_months: config.voucher_validity_months,
            minimum_redemption_cents: config.minimum_redemption_cents,
            expiry_warning_days: config.expiry_warning_days,
            values_cents: config.voucher_values_cents.clone(),
        }
    }

    pub fn value_for(&self, application: &Application) -> u64 {
        application
            .disabilities
            .iter()
            .filter_map(|kind| self.values_cents.get(kind))
            .sum()
    }
}

/// Counts from one run of the expiration sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: Vec<VoucherCode>,
    pub warned: Vec<VoucherCode>,
}

pub struct VoucherService {
    vouchers: Arc<dyn VoucherRepository>,
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventLog>,
    notifications: Arc<NotificationService>,
    policy: VoucherPolicy,
}

impl VoucherService {
    pub fn new(
        vouchers: Arc<dyn VoucherRepository>,
        users: Arc<dyn UserRepository>,
        events: Arc<dyn EventLog>,
        notifications: Arc<NotificationService>,
        policy: VoucherPolicy,
    ) -> Self {
        Self {
            vouchers,
            users,
            events,
            notifications,
            policy,
        }
    }

    pub fn policy(&self) -> &VoucherPolicy {
        &self.policy
    }

    /// Issue the voucher for an approved application.
    pub fn issue(
        &self,
        actor_id: Option<&UserId>,
        application: &Application,
        now: DateTime<Utc>,
    ) -> Result<Voucher, VoucherError> {
        let value_cents = self.policy.value_for(application);
        if value_cents == 0 {
            return Err(VoucherError::NoValue);
        }
        let expires_at = now
            .checked_add_months(Months::new(self.policy.validity_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut rng = rand::thread_rng();
        let mut stored = None;
        for _ in 0..CODE_ATTEMPTS {
            let voucher = Voucher {
                code: code::generate(&mut rng),
                application_id: application.id.clone(),
                constituent_id: application.user_id.clone(),
                initial_value_cents: value_cents,
                remaining_value_cents: value_cents,
                status: VoucherStatus::Active,
                issued_at: now,
                expires_at,
                last_used_at: None,
                expiry_warning_sent: false,
            };
            match self.vouchers.insert_voucher(voucher) {
                Ok(voucher) => {
                    stored = Some(voucher);
                    break;
                }
                Err(RepositoryError::Conflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        let voucher = stored.ok_or(VoucherError::CodeExhausted)?;

        info!(voucher = %voucher.code, application = %application.id, value_cents, "voucher issued");
        self.record(
            actor_id,
            "voucher_issued",
            &voucher,
            json!({ "application": application.id.0, "value_cents": value_cents }),
            now,
        );
        self.notifications.dispatch(
            &voucher.constituent_id,
            actor_id,
            NotificationAction::VoucherIssued {
                code: voucher.code.0.clone(),
                value_cents,
                expires_at,
            },
            now,
        );
        Ok(voucher)
    }

    pub fn get(&self, code: &VoucherCode) -> Result<Voucher, VoucherError> {
        self.vouchers
            .fetch_voucher(code)?
            .ok_or_else(|| VoucherError::NotFound(code.clone()))
    }

    /// Vendor-facing view of a voucher.
    pub fn lookup(&self, vendor: &User, code: &VoucherCode) -> Result<VoucherLookup, VoucherError> {
        if !vendor.is_approved_vendor() {
            return Err(VoucherError::VendorNotApproved);
        }
        let voucher = self.get(code)?;
        let constituent_display_name = self
            .users
            .fetch_user(&voucher.constituent_id)?
            .map(|user| {
                let initial = user.last_name.chars().next().map(String::from).unwrap_or_default();
                format!("{} {}.", user.first_name, initial)
            })
            .unwrap_or_default();
        Ok(VoucherLookup {
            status: voucher.status.label(),
            remaining_value_cents: voucher.remaining_value_cents,
            expires_at: voucher.expires_at,
            code: voucher.code,
            constituent_display_name,
        })
    }

    pub fn redeem(
        &self,
        vendor: &User,
        code: &VoucherCode,
        request: RedemptionRequest,
        now: DateTime<Utc>,
    ) -> Result<(Voucher, VoucherTransaction), VoucherError> {
        if !vendor.is_approved_vendor() {
            return Err(VoucherError::VendorNotApproved);
        }
        let mut voucher = self.get(code)?;
        if voucher.status != VoucherStatus::Active {
            return Err(VoucherError::NotActive {
                status: voucher.status,
                action: "redeemed",
            });
        }
        if voucher.is_expired_at(now) {
            return Err(VoucherError::Expired(voucher.expires_at));
        }

        let amount = request.amount_cents;
        let remaining = voucher.remaining_value_cents;
        if amount == 0 {
            return Err(VoucherError::ZeroAmount);
        }
        if amount > remaining {
            return Err(VoucherError::InsufficientBalance(remaining));
        }
        if amount < self.policy.minimum_redemption_cents && amount != remaining {
            return Err(VoucherError::BelowMinimum(self.policy.minimum_redemption_cents));
        }

        let transaction_id = TRANSACTION_SEQUENCE.next_id();
        let transaction = VoucherTransaction {
            reference_number: format!("TXN-{}-{}", now.format("%Y%m%d"), &transaction_id[4..]),
            id: TransactionId(transaction_id),
            voucher_code: voucher.code.clone(),
            vendor_id: vendor.id.clone(),
            amount_cents: amount,
            products: request
                .products
                .into_iter()
                .map(|product| product.trim().to_string())
                .filter(|product| !product.is_empty())
                .collect(),
            processed_at: now,
            invoice_id: None,
        };

        voucher.remaining_value_cents = remaining - amount;
        voucher.last_used_at = Some(now);
        if voucher.remaining_value_cents == 0 {
            voucher.status = VoucherStatus::Redeemed;
        }
        self.vouchers
            .record_redemption(voucher.clone(), remaining, transaction.clone())?;

        info!(
            voucher = %voucher.code,
            vendor = %vendor.id,
            amount_cents = amount,
            remaining_cents = voucher.remaining_value_cents,
            "voucher redeemed"
        );
        self.record(
            Some(&vendor.id),
            "voucher_redeemed",
            &voucher,
            json!({
                "transaction": transaction.id.0,
                "amount_cents": amount,
                "remaining_cents": voucher.remaining_value_cents,
            }),
            now,
        );
        self.notifications.dispatch(
            &voucher.constituent_id,
            Some(&vendor.id),
            NotificationAction::VoucherRedeemed {
                code: voucher.code.0.clone(),
                amount_cents: amount,
                remaining_cents: voucher.remaining_value_cents,
            },
            now,
        );
        Ok((voucher, transaction))
    }

    pub fn cancel(
        &self,
        admin: &User,
        code: &VoucherCode,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Voucher, VoucherError> {
        let current = self.get(code)?;
        if current.status != VoucherStatus::Active {
            return Err(VoucherError::NotActive {
                status: current.status,
                action: "cancelled",
            });
        }
        let mut voucher = current.clone();
        voucher.status = VoucherStatus::Cancelled;
        self.vouchers.update_voucher(&current, voucher.clone())?;

        self.record(
            Some(&admin.id),
            "voucher_cancelled",
            &voucher,
            json!({ "reason": reason, "remaining_cents": voucher.remaining_value_cents }),
            now,
        );
        self.notifications.dispatch(
            &voucher.constituent_id,
            Some(&admin.id),
            NotificationAction::VoucherCancelled {
                code: voucher.code.0.clone(),
                reason,
            },
            now,
        );
        Ok(voucher)
    }

    pub fn transactions(&self, code: &VoucherCode) -> Result<Vec<VoucherTransaction>, VoucherError> {
        Ok(self.vouchers.transactions_for_voucher(code)?)
    }

    /// Expire every active voucher past its date and warn once about those expiring soon.
    /// Safe to re-run: expired vouchers leave the active set and warnings are flagged.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Result<SweepReport, VoucherError> {
        let horizon = now + Duration::days(self.policy.expiry_warning_days);
        let mut report = SweepReport::default();

        for current in self.vouchers.active_vouchers_expiring_by(horizon)? {
            let mut voucher = current.clone();
            if voucher.is_expired_at(now) {
                voucher.status = VoucherStatus::Expired;
                if !self.replace_in_sweep(&current, &voucher)? {
                    continue;
                }
                self.record(
                    None,
                    "voucher_expired",
                    &voucher,
                    json!({ "remaining_cents": voucher.remaining_value_cents }),
                    now,
                );
                self.notifications.dispatch(
                    &voucher.constituent_id,
                    None,
                    NotificationAction::VoucherExpired {
                        code: voucher.code.0.clone(),
                    },
                    now,
                );
                report.expired.push(voucher.code);
            } else if !voucher.expiry_warning_sent {
                voucher.expiry_warning_sent = true;
                if !self.replace_in_sweep(&current, &voucher)? {
                    continue;
                }
                self.notifications.dispatch(
                    &voucher.constituent_id,
                    None,
                    NotificationAction::VoucherExpiring {
                        code: voucher.code.0.clone(),
                        remaining_cents: voucher.remaining_value_cents,
                        expires_at: voucher.expires_at,
                    },
                    now,
                );
                report.warned.push(voucher.code);
            }
        }

        if !report.expired.is_empty() || !report.warned.is_empty() {
            warn!(
                expired = report.expired.len(),
                warned = report.warned.len(),
                "voucher expiration sweep updated vouchers"
            );
        }
        Ok(report)
    }

    /// `false` when the voucher changed after it was listed; the next sweep sees the new state.
    fn replace_in_sweep(&self, current: &Voucher, updated: &Voucher) -> Result<bool, VoucherError> {
        match self.vouchers.update_voucher(current, updated.clone()) {
            Ok(()) => Ok(true),
            Err(RepositoryError::Conflict) => {
                warn!(code = %current.code.0, "voucher changed during expiration sweep; skipped");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn record(
        &self,
        actor_id: Option<&UserId>,
        action: &str,
        voucher: &Voucher,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        audit::record(
            self.events.as_ref(),
            Event::new(actor_id, action, "voucher", &voucher.code.0, metadata, now),
        );
    }
}
