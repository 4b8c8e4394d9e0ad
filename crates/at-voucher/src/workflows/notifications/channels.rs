use std::sync::{Arc, Mutex};

use tracing::info;

use super::domain::DeliveryMethod;
use super::templates::RenderedMessage;
use crate::workflows::accounts::User;
use crate::workflows::sequence::Sequence;

static MESSAGE_SEQUENCE: Sequence = Sequence::new("msg");

/// Provider identifier returned by a successful hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Worth retrying (provider timeout, rate limit).
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Retrying cannot help (no fax number, no mailing address).
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// One outbound transport per delivery method.
pub trait DeliveryChannel: Send + Sync {
    fn method(&self) -> DeliveryMethod;
    fn deliver(
        &self,
        recipient: &User,
        message: &RenderedMessage,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Message handed to a transport, kept so operators and tests can inspect what went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_id: String,
    pub destination: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default, Clone)]
struct Outbox {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl Outbox {
    fn push(&self, destination: String, message: &RenderedMessage) -> DeliveryReceipt {
        let message_id = MESSAGE_SEQUENCE.next_id();
        let mut guard = self.sent.lock().expect("outbox mutex poisoned");
        guard.push(OutboundMessage {
            message_id: message_id.clone(),
            destination,
            subject: message.subject.clone(),
            body: message.body.clone(),
        });
        DeliveryReceipt {
            message_id: Some(message_id),
        }
    }

    fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("outbox mutex poisoned").clone()
    }
}

/// Email transport. Message ids match what the inbound delivery webhooks report back.
#[derive(Default, Clone)]
pub struct EmailOutbox {
    outbox: Outbox,
}

impl EmailOutbox {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.outbox.messages()
    }
}

impl DeliveryChannel for EmailOutbox {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Email
    }

    fn deliver(
        &self,
        recipient: &User,
        message: &RenderedMessage,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if recipient.email.trim().is_empty() {
            return Err(DeliveryError::Permanent("recipient has no email".to_string()));
        }
        let receipt = self.outbox.push(recipient.email.clone(), message);
        info!(to = %recipient.email, subject = %message.subject, "email queued with provider");
        Ok(receipt)
    }
}

#[derive(Default, Clone)]
pub struct FaxOutbox {
    outbox: Outbox,
}

impl FaxOutbox {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.outbox.messages()
    }
}

impl DeliveryChannel for FaxOutbox {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Fax
    }

    fn deliver(
        &self,
        recipient: &User,
        message: &RenderedMessage,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let fax = recipient
            .fax
            .as_deref()
            .filter(|fax| !fax.trim().is_empty())
            .ok_or_else(|| DeliveryError::Permanent("recipient has no fax number".to_string()))?;
        let receipt = self.outbox.push(fax.to_string(), message);
        info!(to = %fax, subject = %message.subject, "fax queued with provider");
        Ok(receipt)
    }
}

/// Letters are batched for printing and mailing by staff.
#[derive(Default, Clone)]
pub struct PrintQueue {
    outbox: Outbox,
}

impl PrintQueue {
    pub fn pending_letters(&self) -> Vec<OutboundMessage> {
        self.outbox.messages()
    }
}

impl DeliveryChannel for PrintQueue {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Letter
    }

    fn deliver(
        &self,
        recipient: &User,
        message: &RenderedMessage,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let address = recipient.address.as_ref().ok_or_else(|| {
            DeliveryError::Permanent("recipient has no mailing address".to_string())
        })?;
        let destination = format!(
            "{}, {}, {} {}",
            address.line1, address.city, address.state, address.zip
        );
        let receipt = self.outbox.push(destination, message);
        info!(recipient = %recipient.id, "letter added to print queue");
        Ok(receipt)
    }
}
