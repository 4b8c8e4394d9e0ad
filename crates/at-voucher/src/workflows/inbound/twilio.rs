use serde::Deserialize;

use crate::workflows::notifications::DeliveryStatus;

/// Form-encoded fax status callback.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FaxStatusCallback {
    #[serde(rename = "FaxSid")]
    pub fax_sid: String,
    #[serde(rename = "Status", alias = "FaxStatus")]
    pub status: String,
    #[serde(rename = "ErrorMessage", default)]
    pub error_message: Option<String>,
}

impl FaxStatusCallback {
    pub fn delivery_status(&self) -> DeliveryStatus {
        map_status(&self.status)
    }

    pub fn detail(&self) -> Option<String> {
        match self.delivery_status() {
            DeliveryStatus::Failed => Some(
                self.error_message
                    .clone()
                    .unwrap_or_else(|| format!("fax {}", self.status.trim())),
            ),
            _ => None,
        }
    }
}

pub fn map_status(raw: &str) -> DeliveryStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "delivered" => DeliveryStatus::Delivered,
        "failed" | "no-answer" | "busy" | "canceled" => DeliveryStatus::Failed,
        _ => DeliveryStatus::Sent,
    }
}
