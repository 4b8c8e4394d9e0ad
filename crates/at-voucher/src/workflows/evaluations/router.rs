use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::domain::EvaluationId;
use super::service::EvaluationError;
use crate::error::error_response;
use crate::workflows::accounts::{authorize, UserRole};
use crate::workflows::http::{now, reject, HandlerResult};
use crate::workflows::Services;

impl IntoResponse for EvaluationError {
    fn into_response(self) -> Response {
        let status = match self {
            EvaluationError::NotFound(_) => StatusCode::NOT_FOUND,
            EvaluationError::NotAssigned => StatusCode::FORBIDDEN,
            EvaluationError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EvaluationError::ScheduledInPast
            | EvaluationError::MissingLocation
            | EvaluationError::NoRecommendations => StatusCode::UNPROCESSABLE_ENTITY,
            EvaluationError::Repository(err) => return err.into_response(),
        };
        error_response(status, self.to_string())
    }
}

pub(crate) fn routes() -> Router<Arc<Services>> {
    Router::new()
        .route("/api/v1/evaluator/evaluations", get(assigned))
        .route("/api/v1/evaluator/evaluations/:id/schedule", post(schedule))
        .route("/api/v1/evaluator/evaluations/:id/complete", post(complete))
        .route("/api/v1/evaluations/:id/cancel", post(cancel))
}

async fn assigned(State(services): State<Arc<Services>>, headers: HeaderMap) -> HandlerResult {
    let evaluator =
        authorize(services.users.as_ref(), &headers, &[UserRole::Evaluator]).map_err(reject)?;
    let evaluations = services
        .evaluations
        .list_for_evaluator(&evaluator)
        .map_err(reject)?;
    Ok(Json(evaluations).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleBody {
    scheduled_for: DateTime<Utc>,
    location: String,
}

async fn schedule(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ScheduleBody>,
) -> HandlerResult {
    let evaluator =
        authorize(services.users.as_ref(), &headers, &[UserRole::Evaluator]).map_err(reject)?;
    let evaluation = services
        .evaluations
        .schedule(
            &evaluator,
            &EvaluationId(id),
            body.scheduled_for,
            body.location,
            now(),
        )
        .map_err(reject)?;
    Ok(Json(evaluation).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteBody {
    recommended_products: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

async fn complete(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> HandlerResult {
    let evaluator =
        authorize(services.users.as_ref(), &headers, &[UserRole::Evaluator]).map_err(reject)?;
    let evaluation = services
        .evaluations
        .complete(
            &evaluator,
            &EvaluationId(id),
            body.recommended_products,
            body.notes,
            now(),
        )
        .map_err(reject)?;
    Ok(Json(evaluation).into_response())
}

async fn cancel(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    let actor = authorize(
        services.users.as_ref(),
        &headers,
        &[UserRole::Evaluator, UserRole::Administrator],
    )
    .map_err(reject)?;
    let evaluation = services
        .evaluations
        .cancel(&actor, &EvaluationId(id), now())
        .map_err(reject)?;
    Ok(Json(evaluation).into_response())
}
