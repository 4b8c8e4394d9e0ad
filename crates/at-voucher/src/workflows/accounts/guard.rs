use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::domain::{User, UserId, UserRole};
use super::repository::UserRepository;
use crate::error::error_response;
use crate::store::RepositoryError;

/// Header carrying the authenticated user's id, set by the session layer in front of the API.
pub const ACTOR_HEADER: &str = "x-user-id";

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("authentication required")]
    MissingActor,
    #[error("unknown user {0}")]
    UnknownActor(UserId),
    #[error("{} accounts may not access this resource", .0.label())]
    Forbidden(UserRole),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthorizationError::MissingActor | AuthorizationError::UnknownActor(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthorizationError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthorizationError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

/// Resolve the acting user and require one of `allowed` roles.
pub fn authorize(
    users: &dyn UserRepository,
    headers: &HeaderMap,
    allowed: &[UserRole],
) -> Result<User, AuthorizationError> {
    let raw = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AuthorizationError::MissingActor)?;

    let id = UserId(raw.to_string());
    let user = users
        .fetch_user(&id)?
        .ok_or_else(|| AuthorizationError::UnknownActor(id))?;

    if !allowed.contains(&user.role) {
        return Err(AuthorizationError::Forbidden(user.role));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflows::testing::{admin, constituent};
    use axum::http::HeaderValue;

    fn headers_for(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(id).expect("header"));
        headers
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let store = MemoryStore::default();
        let err = authorize(&store, &HeaderMap::new(), &[UserRole::Administrator])
            .expect_err("no actor");
        assert!(matches!(err, AuthorizationError::MissingActor));
    }

    #[test]
    fn unknown_user_is_rejected() {
        let store = MemoryStore::default();
        let err = authorize(&store, &headers_for("usr-ghost"), &[UserRole::Administrator])
            .expect_err("unknown actor");
        assert!(matches!(err, AuthorizationError::UnknownActor(_)));
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let store = MemoryStore::default();
        let user = store.insert_user(constituent("usr-c1")).expect("insert");
        let err = authorize(&store, &headers_for(&user.id.0), &[UserRole::Administrator])
            .expect_err("constituent cannot act as admin");
        assert!(matches!(err, AuthorizationError::Forbidden(UserRole::Constituent)));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn allowed_role_resolves_user() {
        let store = MemoryStore::default();
        store.insert_user(admin("usr-a1")).expect("insert");
        let user = authorize(&store, &headers_for("usr-a1"), &[UserRole::Administrator])
            .expect("admin allowed");
        assert_eq!(user.role, UserRole::Administrator);
    }
}
