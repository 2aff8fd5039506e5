//! Error surfacing for the two transport layers
//!
//! The RPC tool surface wraps every failure in the `{isError: true, text}`
//! envelope with HTTP 200. The REST mirror maps the taxonomy onto status
//! codes: 400 validation, 401 credential, 404 not-found or cross-tenant
//! hidden, 422 malformed body, 429 quota/burst, 500 unexpected. Internal
//! failure detail never leaves the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hivemind_core::Error;
use serde_json::json;
use tracing::error;

/// Message shown to the caller for a given error
///
/// Caller-fault errors carry their full message; infrastructure errors are
/// logged and replaced with a generic line.
pub fn caller_text(err: &Error) -> String {
    match err {
        Error::Validation(msg)
        | Error::Auth(msg)
        | Error::QuotaExceeded(msg)
        | Error::PolicyDenied(msg)
        | Error::ContentRejected(msg)
        | Error::InvalidInput(msg) => msg.clone(),
        Error::NotFound(id) => format!("Knowledge item '{id}' not found."),
        Error::Serialization(_) => "Malformed request body.".to_string(),
        Error::Storage(_) | Error::Dependency(_) | Error::InvalidState(_) | Error::Io(_) => {
            error!("internal error: {err}");
            "Internal server error.".to_string()
        }
    }
}

/// HTTP status for the REST mirror
pub fn status_code(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::InvalidInput(_) | Error::ContentRejected(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        // Cross-tenant reads must be indistinguishable from missing rows
        Error::NotFound(_) | Error::PolicyDenied(_) => StatusCode::NOT_FOUND,
        Error::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::Storage(_) | Error::Dependency(_) | Error::InvalidState(_) | Error::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// REST-layer error wrapper with an `IntoResponse` mapping
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(&self.0);
        let body = Json(json!({ "detail": caller_text(&self.0) }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_code(&Error::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_code(&Error::Auth("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_code(&Error::NotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_code(&Error::QuotaExceeded("x".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_code(&Error::Storage("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_is_hidden() {
        let text = caller_text(&Error::Storage("connection pool exhausted at 10.0.0.5".into()));
        assert_eq!(text, "Internal server error.");
    }

    #[test]
    fn policy_denial_masks_as_not_found() {
        assert_eq!(
            status_code(&Error::PolicyDenied("hidden".into())),
            StatusCode::NOT_FOUND
        );
    }
}
