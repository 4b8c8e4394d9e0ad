use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::error_response;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Inbound email carries base64 attachments, so webhook bodies may run well past 5 MiB.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing webhook signature")]
    Missing,
    #[error("webhook signature is not valid hex")]
    Malformed,
    #[error("webhook signature does not match")]
    Mismatch,
}

impl IntoResponse for SignatureError {
    fn into_response(self) -> Response {
        error_response(StatusCode::UNAUTHORIZED, self.to_string())
    }
}

/// HMAC-SHA256 over the raw request body with a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Arc<[u8]>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length")
    }

    /// Hex signature for `body`; what a sender puts in [`SIGNATURE_HEADER`].
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        let signature = signature
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(SignatureError::Missing)?;
        let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
        let mut mac = self.mac();
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// Middleware rejecting unsigned or mis-signed webhook calls before any extractor runs.
pub async fn require_signature(
    State(verifier): State<WebhookVerifier>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_WEBHOOK_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, path = %parts.uri.path(), "webhook body could not be read");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "webhook body too large");
        }
    };
    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(err) = verifier.verify(&bytes, signature) {
        warn!(path = %parts.uri.path(), error = %err, "webhook rejected");
        return err.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_own_signature_only() {
        let verifier = WebhookVerifier::new("topsecret");
        let body = br#"{"RecordType":"Delivery"}"#;
        let signature = verifier.sign(body);
        assert_eq!(signature.len(), 64);

        assert_eq!(verifier.verify(body, Some(&signature)), Ok(()));
        assert_eq!(
            verifier.verify(b"tampered", Some(&signature)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(verifier.verify(body, None), Err(SignatureError::Missing));
        assert_eq!(
            verifier.verify(body, Some("not-hex")),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            WebhookVerifier::new("other").verify(body, Some(&signature)),
            Err(SignatureError::Mismatch)
        );
    }
}
