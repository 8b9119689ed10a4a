use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::registration::RegistrationError;
use crate::session::SessionError;

/// An error response: `{ "error": ..., "context": ... }` with a status code.
#[derive(Debug)]
pub struct ApiErrorType {
    status: StatusCode,
    error: String,
    context: Option<String>,
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status, error, context): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status,
            error: error.to_string(),
            context,
        }
    }
}

impl From<RegistrationError> for ApiErrorType {
    fn from(err: RegistrationError) -> Self {
        let status = match &err {
            RegistrationError::CapacityExceeded { .. }
            | RegistrationError::DuplicateCourse { .. }
            | RegistrationError::TimeConflict { .. }
            | RegistrationError::AlreadyEnrolled { .. }
            | RegistrationError::SectionClosed { .. } => StatusCode::CONFLICT,
            RegistrationError::EmptyCart => StatusCode::BAD_REQUEST,
            RegistrationError::SessionEnded => StatusCode::UNAUTHORIZED,
            RegistrationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            error: err.to_string(),
            context: None,
        }
    }
}

impl From<SessionError> for ApiErrorType {
    fn from(err: SessionError) -> Self {
        let (status, error) = match err {
            SessionError::LoginDisabled => (StatusCode::FORBIDDEN, "Login unavailable"),
            SessionError::IdentityRejected => (StatusCode::UNAUTHORIZED, "Login rejected"),
            _ => (StatusCode::UNAUTHORIZED, "Invalid session"),
        };

        Self {
            status,
            error: error.to_string(),
            context: Some(err.to_string()),
        }
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        let body = match self.context {
            Some(context) => json!({ "error": self.error, "context": context }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}
