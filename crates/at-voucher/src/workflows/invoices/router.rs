use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::domain::{BillingPeriod, InvoiceId};
use super::service::InvoiceError;
use crate::error::error_response;
use crate::workflows::accounts::{authorize, UserId, UserRepository, UserRole};
use crate::workflows::http::{now, reject, HandlerResult};
use crate::workflows::Services;

impl IntoResponse for InvoiceError {
    fn into_response(self) -> Response {
        let status = match self {
            InvoiceError::NotFound(_) => StatusCode::NOT_FOUND,
            InvoiceError::NotAVendor(_) | InvoiceError::MissingCheckNumber => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            InvoiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            InvoiceError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InvoiceError::Repository(err) => return err.into_response(),
        };
        error_response(status, self.to_string())
    }
}

pub(crate) fn routes() -> Router<Arc<Services>> {
    Router::new()
        .route("/api/v1/admin/invoices/generate", post(generate))
        .route("/api/v1/admin/invoices/:id", get(show))
        .route("/api/v1/admin/invoices/:id/approve", post(approve))
        .route("/api/v1/admin/invoices/:id/payment", post(record_payment))
        .route("/api/v1/admin/invoices/:id/cancel", post(cancel))
        .route("/api/v1/admin/invoices/:id/export", get(export))
        .route("/api/v1/vendor/invoices", get(vendor_invoices))
}

/// Without a period the previous calendar month is billed; without a vendor every approved
/// vendor is.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateBody {
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    vendor_id: Option<String>,
}

async fn generate(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    body: Option<Json<GenerateBody>>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let now = now();
    let period = match (body.start, body.end) {
        (None, None) => BillingPeriod::previous_month(now),
        (Some(start), Some(end)) => BillingPeriod::new(start, end).ok_or_else(|| {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "start must be before end")
        })?,
        _ => {
            return Err(error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "start and end must be given together",
            ))
        }
    };

    let invoices = match body.vendor_id {
        Some(vendor_id) => {
            let vendor_id = UserId(vendor_id);
            let vendor = services
                .users
                .fetch_user(&vendor_id)
                .map_err(reject)?
                .ok_or_else(|| reject(InvoiceError::NotAVendor(vendor_id)))?;
            services
                .invoices
                .generate_for_vendor(Some(&admin.id), &vendor, period, now)
                .map_err(reject)?
                .into_iter()
                .collect()
        }
        None => services
            .invoices
            .generate_all(Some(&admin.id), period, now)
            .map_err(reject)?,
    };
    Ok((StatusCode::CREATED, Json(invoices)).into_response())
}

async fn show(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let invoice = services.invoices.get(&InvoiceId(id)).map_err(reject)?;
    Ok(Json(invoice).into_response())
}

async fn approve(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let invoice = services
        .invoices
        .approve(&admin, &InvoiceId(id), now())
        .map_err(reject)?;
    Ok(Json(invoice).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentBody {
    check_number: String,
}

async fn record_payment(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PaymentBody>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let invoice = services
        .invoices
        .record_payment(&admin, &InvoiceId(id), body.check_number, now())
        .map_err(reject)?;
    Ok(Json(invoice).into_response())
}

async fn cancel(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    let admin =
        authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let invoice = services
        .invoices
        .cancel(&admin, &InvoiceId(id), now())
        .map_err(reject)?;
    Ok(Json(invoice).into_response())
}

async fn export(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult {
    authorize(services.users.as_ref(), &headers, &[UserRole::Administrator]).map_err(reject)?;
    let (invoice, body) = services
        .invoices
        .export_csv(&InvoiceId(id))
        .map_err(reject)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.csv\"", invoice.number),
            ),
        ],
        body,
    )
        .into_response())
}

async fn vendor_invoices(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
) -> HandlerResult {
    let vendor = authorize(services.users.as_ref(), &headers, &[UserRole::Vendor]).map_err(reject)?;
    let invoices = services.invoices.for_vendor(&vendor.id).map_err(reject)?;
    Ok(Json(invoices).into_response())
}
