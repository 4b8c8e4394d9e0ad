use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{middleware, Form, Json, Router};
use serde_json::json;
use tracing::{info, warn};

use super::mailbox::{InboundEmail, MailboxError};
use super::postmark::DeliveryEvent;
use super::signature::{require_signature, WebhookVerifier, MAX_WEBHOOK_BODY_BYTES};
use super::twilio::FaxStatusCallback;
use crate::workflows::http::{now, reject, HandlerResult};
use crate::workflows::notifications::{DeliveryStatus, Notification};
use crate::workflows::Services;

impl IntoResponse for MailboxError {
    fn into_response(self) -> Response {
        match self {
            // A 5xx makes the provider retry the delivery later.
            MailboxError::Repository(err) => err.into_response(),
        }
    }
}

/// Provider webhooks. Every route sits behind the shared-secret signature check.
pub(crate) fn routes(verifier: WebhookVerifier) -> Router<Arc<Services>> {
    Router::new()
        .route("/webhooks/postmark/events", post(delivery_event))
        .route("/webhooks/postmark/inbound", post(inbound_email))
        .route("/webhooks/twilio/fax", post(fax_status))
        .route_layer(middleware::from_fn_with_state(verifier, require_signature))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
}

async fn delivery_event(
    State(services): State<Arc<Services>>,
    Json(event): Json<DeliveryEvent>,
) -> HandlerResult {
    let Some(status) = event.delivery_status() else {
        info!(record_type = ?event.record_type, "ignoring postmark event");
        return Ok(acknowledged(None));
    };
    let updated = services
        .notifications
        .record_delivery_status(&event.message_id, status, event.detail(), now())
        .map_err(reject)?;
    if updated.is_none() {
        warn!(message_id = %event.message_id, "postmark event for unknown message");
    }
    Ok(acknowledged(updated.as_ref()))
}

async fn fax_status(
    State(services): State<Arc<Services>>,
    Form(callback): Form<FaxStatusCallback>,
) -> HandlerResult {
    let status = callback.delivery_status();
    let updated = services
        .notifications
        .record_delivery_status(&callback.fax_sid, status, callback.detail(), now())
        .map_err(reject)?;
    if updated.is_none() {
        warn!(fax_sid = %callback.fax_sid, "fax status for unknown message");
    } else if status == DeliveryStatus::Failed {
        warn!(fax_sid = %callback.fax_sid, status = %callback.status, "fax delivery failed");
    }
    Ok(acknowledged(updated.as_ref()))
}

async fn inbound_email(
    State(services): State<Arc<Services>>,
    Json(email): Json<InboundEmail>,
) -> HandlerResult {
    let outcome = services.mailbox.process(&email, now()).map_err(reject)?;
    Ok(Json(outcome).into_response())
}

/// Providers only look at the status code; the body helps when replaying callbacks by hand.
fn acknowledged(notification: Option<&Notification>) -> Response {
    let body = match notification {
        Some(notification) => json!({
            "notification_id": notification.id.0,
            "delivery_status": notification.delivery_status,
        }),
        None => json!({ "status": "ignored" }),
    };
    (StatusCode::OK, Json(body)).into_response()
}
