use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

/// Handlers return `Ok` for the success body and `Err` for an already-rendered error.
pub(crate) type HandlerResult = Result<Response, Response>;

pub(crate) fn reject(err: impl IntoResponse) -> Response {
    err.into_response()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
