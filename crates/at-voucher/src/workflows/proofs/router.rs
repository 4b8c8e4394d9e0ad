use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use super::attachment::{UploadedDocument, MAX_ATTACHMENT_BYTES};
use super::domain::{ProofType, ReviewDecision, SubmissionChannel};
use super::service::ProofError;
use crate::error::error_response;
use crate::workflows::accounts::{authorize, UserRole};
use crate::workflows::applications::ApplicationId;
use crate::workflows::http::{now, reject, HandlerResult};
use crate::workflows::Services;

impl IntoResponse for ProofError {
    fn into_response(self) -> Response {
        match self {
            ProofError::NotFound(_) => error_response(StatusCode::NOT_FOUND, self.to_string()),
            ProofError::Forbidden => error_response(StatusCode::FORBIDDEN, self.to_string()),
            ProofError::ApplicationClosed(_)
            | ProofError::AlreadyPending { .. }
            | ProofError::NothingToReview(_) => {
                error_response(StatusCode::CONFLICT, self.to_string())
            }
            ProofError::Attachment(_) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ProofError::RateLimited(ref limit) => {
                let retry_after = limit.retry_after_secs.max(1).to_string();
                let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, self.to_string());
                if let Ok(value) = HeaderValue::from_str(&retry_after) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            ProofError::Repository(err) => err.into_response(),
        }
    }
}

/// Room for a base64-encoded attachment at the size cap plus the surrounding JSON fields.
pub(crate) const MAX_UPLOAD_BODY_BYTES: usize = MAX_ATTACHMENT_BYTES.div_ceil(3) * 4 + 64 * 1024;

pub(crate) fn routes() -> Router<Arc<Services>> {
    Router::new()
        .route("/api/v1/applications/:id/proofs", post(upload))
        .route("/api/v1/admin/applications/:id/proofs", get(submissions))
        .route(
            "/api/v1/admin/applications/:id/proofs/:proof_type/review",
            post(review),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES))
}

/// Document upload as JSON; the file travels base64-encoded.
#[derive(Debug, Deserialize)]
pub(crate) struct ProofUpload {
    proof_type: ProofType,
    filename: String,
    #[serde(default)]
    content_type: Option<String>,
    content_base64: String,
}

async fn upload(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ProofUpload>,
) -> HandlerResult {
    let constituent =
        authorize(services.users.as_ref(), &headers, &[UserRole::Constituent]).map_err(reject)?;
    let bytes = STANDARD.decode(body.content_base64.trim()).map_err(|_| {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "content_base64 is not valid base64",
        )
    })?;
    let document = UploadedDocument {
        filename: body.filename,
        content_type: body.content_type,
        bytes,
    };
    let submission = services
        .proofs
        .submit(
            &constituent,
            &ApplicationId(id),
            body.proof_type,
            document,
            SubmissionChannel::Web,
            now(),
        )
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(submission)).into_response())
}

async fn submissions(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let submissions = services
        .proofs
        .submissions(&ApplicationId(id))
        .map_err(reject)?;
    Ok(Json(submissions).into_response())
}

async fn review(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path((id, proof_type)): Path<(String, String)>,
    Json(decision): Json<ReviewDecision>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let proof_type = proof_type
        .parse::<ProofType>()
        .map_err(|message| error_response(StatusCode::NOT_FOUND, message))?;
    let application = services
        .proofs
        .review(&admin, &ApplicationId(id), proof_type, decision, now())
        .map_err(reject)?;
    Ok(Json(application).into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::MAX_UPLOAD_BODY_BYTES;
    use crate::workflows::accounts::{UserRepository, ACTOR_HEADER};
    use crate::workflows::proofs::{
        ProofType, RejectionReason, ReviewDecision, SubmissionChannel, UploadedDocument,
        MAX_ATTACHMENT_BYTES,
    };
    use crate::workflows::router;
    use crate::workflows::testing::{harness, submitted_application};

    fn upload_of(application_id: &str, actor: &str, bytes: &[u8]) -> Request<Body> {
        post_json(
            &format!("/api/v1/applications/{application_id}/proofs"),
            actor,
            json!({
                "proof_type": "income",
                "filename": "tax-return.pdf",
                "content_base64": STANDARD.encode(bytes),
            }),
        )
    }

    fn post_json(uri: &str, actor: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(ACTOR_HEADER, actor)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn upload(application_id: &str, actor: &str, proof_type: &str) -> Request<Body> {
        post_json(
            &format!("/api/v1/applications/{application_id}/proofs"),
            actor,
            json!({
                "proof_type": proof_type,
                "filename": "paystub.pdf",
                "content_base64": STANDARD.encode(b"%PDF-1.4 pay stub"),
            }),
        )
    }

    #[tokio::test]
    async fn upload_then_review_over_http() {
        let harness = harness();
        let application = submitted_application(&harness, "usr-http-proof");
        let app = router(harness.services.clone());

        let response = app
            .clone()
            .oneshot(upload(&application.id.0, "usr-http-proof", "income"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(upload(&application.id.0, "usr-http-proof", "income"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(post_json(
                &format!(
                    "/api/v1/admin/applications/{}/proofs/income/review",
                    application.id.0
                ),
                &harness.admin.id.0,
                json!({ "decision": "approved" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["income_proof"], "approved");
    }

    #[tokio::test]
    async fn bad_base64_is_unprocessable() {
        let harness = harness();
        let application = submitted_application(&harness, "usr-http-b64");
        let app = router(harness.services.clone());

        let response = app
            .oneshot(post_json(
                &format!("/api/v1/applications/{}/proofs", application.id.0),
                "usr-http-b64",
                json!({
                    "proof_type": "residency",
                    "filename": "lease.pdf",
                    "content_base64": "not base64!",
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[tokio::test]
    async fn scans_up_to_the_attachment_cap_are_accepted() {
        let harness = harness();
        let application = submitted_application(&harness, "usr-http-big");
        let app = router(harness.services.clone());

        let scan = vec![b'%'; MAX_ATTACHMENT_BYTES - 1024];
        // Well past axum's 2 MB default once encoded.
        assert!(STANDARD.encode(&scan).len() > 6 * 1024 * 1024);
        assert!(STANDARD.encode(&scan).len() < MAX_UPLOAD_BODY_BYTES);
        let response = app
            .oneshot(upload_of(&application.id.0, "usr-http-big", &scan))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn scans_over_the_attachment_cap_are_unprocessable() {
        let harness = harness();
        let application = submitted_application(&harness, "usr-http-huge");
        let app = router(harness.services.clone());

        let scan = vec![b'%'; MAX_ATTACHMENT_BYTES + 1];
        let response = app
            .oneshot(upload_of(&application.id.0, "usr-http-huge", &scan))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert!(body["error"].as_str().is_some_and(|message| message.contains("the limit is")));
    }

    #[tokio::test]
    async fn upload_past_the_hourly_limit_is_throttled() {
        let harness = harness();
        let application = submitted_application(&harness, "usr-http-burst");
        let owner = harness
            .store
            .fetch_user(&application.user_id)
            .expect("fetch")
            .expect("owner");
        let proofs = &harness.services.proofs;
        for _ in 0..5 {
            proofs
                .submit(
                    &owner,
                    &application.id,
                    ProofType::Income,
                    UploadedDocument {
                        filename: "w2.pdf".to_string(),
                        content_type: None,
                        bytes: b"%PDF-1.4 w2".to_vec(),
                    },
                    SubmissionChannel::Web,
                    Utc::now(),
                )
                .expect("within limit");
            proofs
                .review(
                    &harness.admin,
                    &application.id,
                    ProofType::Income,
                    ReviewDecision::Rejected(RejectionReason::MissingAmount),
                    Utc::now(),
                )
                .expect("reject");
        }

        let app = router(harness.services.clone());
        let response = app
            .oneshot(upload(&application.id.0, "usr-http-burst", "income"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: i64 = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .expect("retry-after seconds");
        assert!((1..=3600).contains(&retry_after));
    }
}
