use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::domain::{UserId, UserRole, VendorStatus};
use super::guard::authorize;
use super::password_reset::PasswordResetError;
use super::registration::{AccountError, AccountForm};
use crate::error::error_response;
use crate::workflows::http::{now, reject, HandlerResult};
use crate::workflows::Services;

impl IntoResponse for PasswordResetError {
    fn into_response(self) -> Response {
        match self {
            PasswordResetError::InvalidToken | PasswordResetError::PasswordTooShort => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            PasswordResetError::Repository(err) => err.into_response(),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        match self {
            AccountError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "account details are invalid",
                    "fields": errors,
                })),
            )
                .into_response(),
            AccountError::EmailTaken(_) => error_response(StatusCode::CONFLICT, self.to_string()),
            AccountError::NotFound(_) => error_response(StatusCode::NOT_FOUND, self.to_string()),
            AccountError::NotAVendor(_) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            AccountError::Repository(err) => err.into_response(),
        }
    }
}

pub(crate) fn routes() -> Router<Arc<Services>> {
    Router::new()
        .route(
            "/api/v1/password-resets",
            post(request_reset).put(complete_reset),
        )
        .route("/api/v1/registrations", post(register))
        .route("/api/v1/admin/users", post(create_user))
        .route("/api/v1/admin/users/:id/vendor-status", put(vendor_status))
}

/// An account opened by an administrator.
#[derive(Debug, Deserialize)]
pub(crate) struct NewUser {
    role: UserRole,
    #[serde(flatten)]
    account: AccountForm,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VendorStatusChange {
    status: VendorStatus,
}

async fn register(
    State(services): State<Arc<Services>>,
    Json(form): Json<AccountForm>,
) -> HandlerResult {
    let user = services
        .accounts
        .register_constituent(form, now())
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

async fn create_user(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Json(body): Json<NewUser>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let user = services
        .accounts
        .create_user(&admin, body.account, body.role, now())
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

async fn vendor_status(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<VendorStatusChange>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let vendor = services
        .accounts
        .set_vendor_status(&admin, &UserId(id), body.status, now())
        .map_err(reject)?;
    Ok(Json(vendor).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResetRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResetCompletion {
    token: String,
    password: String,
}

async fn request_reset(
    State(services): State<Arc<Services>>,
    Json(body): Json<ResetRequest>,
) -> HandlerResult {
    services
        .password_resets
        .request(&body.email, now())
        .map_err(reject)?;
    // Same answer whether or not the address has an account.
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "if the address is registered, a reset code has been sent" })),
    )
        .into_response())
}

async fn complete_reset(
    State(services): State<Arc<Services>>,
    Json(body): Json<ResetCompletion>,
) -> HandlerResult {
    services
        .password_resets
        .reset(&body.token, &body.password, now())
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::workflows::accounts::ACTOR_HEADER;
    use crate::workflows::router;
    use crate::workflows::testing::harness;

    fn send(method: &str, uri: &str, actor: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor);
        }
        builder.body(Body::from(body.to_string())).expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn registered_constituent_can_start_an_application() {
        let harness = harness();
        let app = router(harness.services.clone());

        let response = app
            .clone()
            .oneshot(send(
                "POST",
                "/api/v1/registrations",
                None,
                json!({
                    "email": "sam@residents.example",
                    "first_name": "Sam",
                    "last_name": "Ito",
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let user = json_body(response).await;
        assert_eq!(user["role"], "constituent");
        let id = user["id"].as_str().expect("user id").to_string();

        let response = app
            .oneshot(send(
                "POST",
                "/api/v1/applications",
                Some(&id),
                json!({ "intent": "save_draft" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn administrators_provision_and_approve_vendors() {
        let harness = harness();
        let app = router(harness.services.clone());
        let admin = harness.admin.id.0.clone();

        let response = app
            .clone()
            .oneshot(send(
                "POST",
                "/api/v1/admin/users",
                Some(&admin),
                json!({
                    "role": "vendor",
                    "email": "orders@lowvision.example",
                    "first_name": "Dana",
                    "last_name": "Pryce",
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let vendor = json_body(response).await;
        assert_eq!(vendor["vendor_status"], "pending");
        let id = vendor["id"].as_str().expect("vendor id").to_string();

        let response = app
            .clone()
            .oneshot(send(
                "PUT",
                &format!("/api/v1/admin/users/{id}/vendor-status"),
                Some(&admin),
                json!({ "status": "approved" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["vendor_status"], "approved");

        let response = app
            .clone()
            .oneshot(send(
                "POST",
                "/api/v1/admin/users",
                Some(&id),
                json!({
                    "role": "administrator",
                    "email": "insider@vendors.example",
                    "first_name": "Lee",
                    "last_name": "Quinn",
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(send(
                "POST",
                "/api/v1/admin/users",
                Some(&admin),
                json!({
                    "role": "evaluator",
                    "email": "Orders@LowVision.example",
                    "first_name": "Jamie",
                    "last_name": "Ruiz",
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
