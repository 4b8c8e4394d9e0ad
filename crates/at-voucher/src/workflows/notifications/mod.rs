//! Notification records, rendering, and queued delivery over email, fax, or letter.

pub mod channels;
pub mod domain;
pub mod queue;
pub mod repository;
pub(crate) mod router;
pub mod service;
pub mod templates;

pub use channels::{
    DeliveryChannel, DeliveryError, DeliveryReceipt, EmailOutbox, FaxOutbox, OutboundMessage,
    PrintQueue,
};
pub use domain::{
    DeliveryMethod, DeliveryStatus, Notification, NotificationAction, NotificationId,
};
pub use queue::{DeliveryJob, DeliveryOutcome, DeliveryWorker, NotificationQueue};
pub use repository::NotificationRepository;
pub use service::{NotificationError, NotificationService};
pub use templates::{render, RenderedMessage};
