use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::accounts::UserId;
use crate::workflows::applications::ApplicationId;
use crate::workflows::invoices::InvoiceId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoucherCode(pub String);

impl VoucherCode {
    /// Codes are read aloud and typed by vendors; accept lowercase and stray separators.
    pub fn normalize(raw: &str) -> Self {
        Self(
            raw.chars()
                .filter(|ch| ch.is_ascii_alphanumeric())
                .map(|ch| ch.to_ascii_uppercase())
                .collect(),
        )
    }
}

impl std::fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Active,
    Redeemed,
    Expired,
    Cancelled,
}

impl VoucherStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VoucherStatus::Active => "active",
            VoucherStatus::Redeemed => "redeemed",
            VoucherStatus::Expired => "expired",
            VoucherStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub code: VoucherCode,
    pub application_id: ApplicationId,
    pub constituent_id: UserId,
    pub initial_value_cents: u64,
    pub remaining_value_cents: u64,
    pub status: VoucherStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expiry_warning_sent: bool,
}

impl Voucher {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub String);

/// One redemption. `invoice_id` is set once the transaction is billed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherTransaction {
    pub id: TransactionId,
    pub voucher_code: VoucherCode,
    pub vendor_id: UserId,
    pub amount_cents: u64,
    pub products: Vec<String>,
    pub reference_number: String,
    pub processed_at: DateTime<Utc>,
    pub invoice_id: Option<InvoiceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub amount_cents: u64,
    #[serde(default)]
    pub products: Vec<String>,
}

/// What a vendor sees when looking a voucher up; no constituent contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherLookup {
    pub code: VoucherCode,
    pub status: &'static str,
    pub remaining_value_cents: u64,
    pub expires_at: DateTime<Utc>,
    pub constituent_display_name: String,
}
