use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use super::service::NotificationError;
use crate::error::error_response;
use crate::workflows::accounts::{authorize, UserRole};
use crate::workflows::http::{reject, HandlerResult};
use crate::workflows::Services;

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        match self {
            NotificationError::UnknownRecipient(_) => {
                error_response(StatusCode::NOT_FOUND, self.to_string())
            }
            NotificationError::QueueClosed => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            NotificationError::Repository(err) => err.into_response(),
        }
    }
}

pub(crate) fn routes() -> Router<Arc<Services>> {
    Router::new().route("/api/v1/notifications", get(inbox))
}

/// The acting user's own notifications, newest first.
async fn inbox(State(services): State<Arc<Services>>, headers: HeaderMap) -> HandlerResult {
    let user = authorize(
        services.users.as_ref(),
        &headers,
        &[
            UserRole::Constituent,
            UserRole::Administrator,
            UserRole::Evaluator,
            UserRole::Vendor,
            UserRole::Trainer,
        ],
    )
    .map_err(reject)?;
    let mut notifications = services
        .notifications
        .for_recipient(&user.id)
        .map_err(reject)?;
    notifications.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    Ok(Json(notifications).into_response())
}
