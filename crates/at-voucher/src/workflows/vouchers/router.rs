use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::domain::{RedemptionRequest, VoucherCode};
use super::service::VoucherError;
use crate::error::error_response;
use crate::workflows::accounts::{authorize, UserRole};
use crate::workflows::http::{now, reject, HandlerResult};
use crate::workflows::Services;

impl IntoResponse for VoucherError {
    fn into_response(self) -> Response {
        let status = match self {
            VoucherError::NotFound(_) => StatusCode::NOT_FOUND,
            VoucherError::VendorNotApproved => StatusCode::FORBIDDEN,
            VoucherError::NotActive { .. } | VoucherError::Expired(_) => StatusCode::CONFLICT,
            VoucherError::ZeroAmount
            | VoucherError::InsufficientBalance(_)
            | VoucherError::BelowMinimum(_)
            | VoucherError::NoValue => StatusCode::UNPROCESSABLE_ENTITY,
            VoucherError::CodeExhausted => StatusCode::SERVICE_UNAVAILABLE,
            VoucherError::Repository(err) => return err.into_response(),
        };
        error_response(status, self.to_string())
    }
}

pub(crate) fn routes() -> Router<Arc<Services>> {
    Router::new()
        .route("/api/v1/vendor/vouchers/:code", get(lookup))
        .route("/api/v1/vendor/vouchers/:code/redeem", post(redeem))
        .route("/api/v1/admin/vouchers/:code", get(show))
        .route("/api/v1/admin/vouchers/:code/cancel", post(cancel))
}

async fn lookup(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> HandlerResult {
    let vendor = authorize(services.users.as_ref(), &headers, &[UserRole::Vendor]).map_err(reject)?;
    let lookup = services
        .vouchers
        .lookup(&vendor, &VoucherCode::normalize(&code))
        .map_err(reject)?;
    Ok(Json(lookup).into_response())
}

async fn redeem(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(request): Json<RedemptionRequest>,
) -> HandlerResult {
    let vendor = authorize(services.users.as_ref(), &headers, &[UserRole::Vendor]).map_err(reject)?;
    let (voucher, transaction) = services
        .vouchers
        .redeem(&vendor, &VoucherCode::normalize(&code), request, now())
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "transaction": transaction,
            "remaining_value_cents": voucher.remaining_value_cents,
            "status": voucher.status,
        })),
    )
        .into_response())
}

async fn show(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> HandlerResult {
    authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let code = VoucherCode::normalize(&code);
    let voucher = services.vouchers.get(&code).map_err(reject)?;
    let transactions = services.vouchers.transactions(&code).map_err(reject)?;
    Ok(Json(json!({ "voucher": voucher, "transactions": transactions })).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelBody {
    reason: String,
}

async fn cancel(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(body): Json<CancelBody>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let reason = body.reason.trim().to_string();
    if reason.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "reason can't be blank",
        ));
    }
    let voucher = services
        .vouchers
        .cancel(&admin, &VoucherCode::normalize(&code), reason, now())
        .map_err(reject)?;
    Ok(Json(voucher).into_response())
}
