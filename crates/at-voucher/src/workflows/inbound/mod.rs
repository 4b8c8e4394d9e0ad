//! Signed provider webhooks: delivery receipts, fax status, and inbound email.

pub mod mailbox;
pub mod postmark;
pub(crate) mod router;
pub mod signature;
pub mod twilio;

pub use mailbox::{
    route, InboundAttachment, InboundEmail, Mailbox, MailboxError, MailboxOutcome, MailboxRouter,
};
pub use postmark::{DeliveryEvent, RecordType};
pub use signature::{require_signature, SignatureError, WebhookVerifier, SIGNATURE_HEADER};
pub use twilio::FaxStatusCallback;
