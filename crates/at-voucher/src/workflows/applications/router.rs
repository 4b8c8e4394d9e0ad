use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationId, ApplicationStatus};
use super::form::ApplicationForm;
use super::service::{ApplicationServiceError, CertificationDecision};
use crate::error::error_response;
use crate::workflows::accounts::{authorize, UserId, UserRole};
use crate::workflows::http::{now, reject, HandlerResult};
use crate::workflows::money::parse_dollars;
use crate::workflows::Services;

impl IntoResponse for ApplicationServiceError {
    fn into_response(self) -> Response {
        match self {
            ApplicationServiceError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "application is invalid",
                    "fields": errors,
                })),
            )
                .into_response(),
            ApplicationServiceError::NotFound(_) => {
                error_response(StatusCode::NOT_FOUND, self.to_string())
            }
            ApplicationServiceError::Forbidden => {
                error_response(StatusCode::FORBIDDEN, self.to_string())
            }
            ApplicationServiceError::ActiveApplicationExists(_)
            | ApplicationServiceError::InvalidTransition { .. } => {
                error_response(StatusCode::CONFLICT, self.to_string())
            }
            ApplicationServiceError::NotReady(_)
            | ApplicationServiceError::MissingMedicalProvider
            | ApplicationServiceError::InvalidEvaluator(_) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ApplicationServiceError::Voucher(err) => err.into_response(),
            ApplicationServiceError::Evaluation(err) => err.into_response(),
            ApplicationServiceError::Repository(err) => err.into_response(),
        }
    }
}

pub(crate) fn routes() -> Router<Arc<Services>> {
    Router::new()
        .route("/api/v1/eligibility", get(eligibility))
        .route("/api/v1/applications", post(create))
        .route("/api/v1/applications/:id", get(show).put(update))
        .route("/api/v1/admin/applications", get(list_by_status))
        .route("/api/v1/admin/applications/:id/approve", post(approve))
        .route("/api/v1/admin/applications/:id/reject", post(reject_application))
        .route("/api/v1/admin/applications/:id/archive", post(archive))
        .route(
            "/api/v1/admin/applications/:id/medical-certification",
            post(medical_certification),
        )
        .route(
            "/api/v1/admin/applications/:id/assign-evaluator",
            post(assign_evaluator),
        )
}

#[derive(Debug, Deserialize)]
pub(crate) struct EligibilityQuery {
    household_size: u32,
    annual_income: String,
}

async fn eligibility(
    State(services): State<Arc<Services>>,
    Query(query): Query<EligibilityQuery>,
) -> HandlerResult {
    if query.household_size == 0 {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "household_size must be at least 1",
        ));
    }
    let income = parse_dollars(&query.annual_income)
        .map_err(|message| error_response(StatusCode::UNPROCESSABLE_ENTITY, message))?;
    let check = services
        .applications
        .threshold()
        .check(query.household_size, income);
    Ok(Json(check).into_response())
}

async fn create(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(form): Json<ApplicationForm>,
) -> HandlerResult {
    let constituent =
        authorize(services.users.as_ref(), &headers, &[UserRole::Constituent]).map_err(reject)?;
    let application = services
        .applications
        .create(&constituent, form, now())
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

async fn update(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(form): Json<ApplicationForm>,
) -> HandlerResult {
    let constituent =
        authorize(services.users.as_ref(), &headers, &[UserRole::Constituent]).map_err(reject)?;
    let application = services
        .applications
        .update(&constituent, &ApplicationId(id), form, now())
        .map_err(reject)?;
    Ok(Json(application).into_response())
}

async fn show(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    let actor = authorize(
        services.users.as_ref(),
        &headers,
        &[
            UserRole::Constituent,
            UserRole::Administrator,
            UserRole::Evaluator,
        ],
    )
    .map_err(reject)?;
    let application = services
        .applications
        .get(&actor, &ApplicationId(id))
        .map_err(reject)?;
    Ok(Json(application).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusQuery {
    status: Option<String>,
}

async fn list_by_status(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> HandlerResult {
    authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let status = match query.status.as_deref() {
        Some(raw) => raw
            .parse::<ApplicationStatus>()
            .map_err(|message| error_response(StatusCode::BAD_REQUEST, message))?,
        None => ApplicationStatus::InProgress,
    };
    let applications = services
        .applications
        .list_by_status(status)
        .map_err(reject)?;
    Ok(Json(applications).into_response())
}

async fn approve(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let (application, voucher) = services
        .applications
        .approve(&admin, &ApplicationId(id), now())
        .map_err(reject)?;
    Ok(Json(json!({ "application": application, "voucher": voucher })).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReasonBody {
    reason: String,
}

fn require_reason(body: ReasonBody) -> Result<String, Response> {
    let reason = body.reason.trim().to_string();
    if reason.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "reason can't be blank",
        ));
    }
    Ok(reason)
}

async fn reject_application(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let reason = require_reason(body)?;
    let application = services
        .applications
        .reject(&admin, &ApplicationId(id), reason, now())
        .map_err(reject)?;
    Ok(Json(application).into_response())
}

async fn archive(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let reason = require_reason(body)?;
    let application = services
        .applications
        .archive(Some(&admin.id), &ApplicationId(id), reason, now())
        .map_err(reject)?;
    Ok(Json(application).into_response())
}

/// `requested` asks the provider; the other decisions record what came back.
#[derive(Debug, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub(crate) enum CertificationRequest {
    Requested,
    Received,
    Approved,
    Rejected { reason: String },
}

async fn medical_certification(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CertificationRequest>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let id = ApplicationId(id);
    let decision = match body {
        CertificationRequest::Requested => {
            let application = services
                .applications
                .request_medical_certification(&admin, &id, now())
                .map_err(reject)?;
            return Ok(Json(application).into_response());
        }
        CertificationRequest::Received => CertificationDecision::Received,
        CertificationRequest::Approved => CertificationDecision::Approved,
        CertificationRequest::Rejected { reason } => CertificationDecision::Rejected { reason },
    };
    let application = services
        .applications
        .record_medical_certification(Some(&admin.id), &id, decision, now())
        .map_err(reject)?;
    Ok(Json(application).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignEvaluator {
    evaluator_id: String,
}

async fn assign_evaluator(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignEvaluator>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let (application, evaluation) = services
        .applications
        .assign_evaluator(&admin, &ApplicationId(id), &UserId(body.evaluator_id), now())
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "application": application, "evaluation": evaluation })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::workflows::accounts::{UserRepository, ACTOR_HEADER};
    use crate::workflows::router;
    use crate::workflows::testing::{constituent, harness};

    fn post_json(uri: &str, actor: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(ACTOR_HEADER, actor)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn submission_errors_are_reported_per_field() {
        let harness = harness();
        harness
            .store
            .insert_user(constituent("usr-web1"))
            .expect("insert");
        let app = router(harness.services.clone());

        let response = app
            .oneshot(post_json(
                "/api/v1/applications",
                "usr-web1",
                json!({ "household_size": "two", "intent": "submit" }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["fields"]["household_size"].is_array());
        assert!(body["fields"]["self_certified"].is_array());
    }

    #[tokio::test]
    async fn constituents_cannot_use_admin_routes() {
        let harness = harness();
        harness
            .store
            .insert_user(constituent("usr-web2"))
            .expect("insert");
        let app = router(harness.services.clone());

        let response = app
            .oneshot(post_json(
                "/api/v1/admin/applications/app-000001/approve",
                "usr-web2",
                json!({}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn eligibility_reports_the_threshold() {
        let harness = harness();
        let app = router(harness.services.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/eligibility?household_size=1&annual_income=%2450%2C000")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["threshold_cents"], 6_024_000);
        assert_eq!(body["eligible"], true);
    }
}
