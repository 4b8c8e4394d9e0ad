use serde::Deserialize;

use crate::workflows::notifications::DeliveryStatus;

/// Postmark delivery webhook payload; only the fields used to update notifications.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryEvent {
    pub record_type: RecordType,
    #[serde(rename = "MessageID")]
    pub message_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RecordType {
    Delivery,
    Bounce,
    Open,
    SpamComplaint,
    #[serde(other)]
    Unsupported,
}

impl DeliveryEvent {
    /// Status to record, or `None` for record types this service ignores.
    pub fn delivery_status(&self) -> Option<DeliveryStatus> {
        match self.record_type {
            RecordType::Delivery => Some(DeliveryStatus::Delivered),
            RecordType::Open => Some(DeliveryStatus::Opened),
            RecordType::Bounce | RecordType::SpamComplaint => Some(DeliveryStatus::Bounced),
            RecordType::Unsupported => None,
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self.record_type {
            RecordType::SpamComplaint => Some("recipient marked the message as spam".to_string()),
            RecordType::Bounce => self
                .description
                .clone()
                .or_else(|| self.details.clone())
                .or_else(|| Some("message bounced".to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounce_payload() {
        let event: DeliveryEvent = serde_json::from_str(
            r#"{
                "RecordType": "Bounce",
                "MessageID": "msg-000042",
                "Type": "HardBounce",
                "Description": "The server was unable to deliver your message",
                "Email": "casey@example.org"
            }"#,
        )
        .expect("bounce parses");
        assert_eq!(event.delivery_status(), Some(DeliveryStatus::Bounced));
        assert_eq!(
            event.detail().as_deref(),
            Some("The server was unable to deliver your message")
        );
    }

    #[test]
    fn unknown_record_types_are_ignored() {
        let event: DeliveryEvent =
            serde_json::from_str(r#"{"RecordType":"SubscriptionChange","MessageID":"m"}"#)
                .expect("parses");
        assert_eq!(event.record_type, RecordType::Unsupported);
        assert_eq!(event.delivery_status(), None);
    }
}
