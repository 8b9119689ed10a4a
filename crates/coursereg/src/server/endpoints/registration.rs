use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use tracing::info;

use crate::server::types::ApiErrorType;
use crate::session::Session;
use crate::types::AppState;

/// POST /cart/validate
///
/// Answers 200 with `{ valid, error?, message? }`; the error text is meant to
/// be shown as is.
pub async fn post_validate(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    info!(session = %session.id, "POST /cart/validate");
    let result = s.registration.validate(&session).await;
    (StatusCode::OK, Json(result)).into_response()
}

/// POST /cart/enroll
///
/// Validation is always re-run here; a previous `/cart/validate` answer is
/// not trusted.
pub async fn post_enroll(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    info!(session = %session.id, "POST /cart/enroll");
    let result = s.registration.enroll(&session).await;
    (StatusCode::OK, Json(result)).into_response()
}

/// GET /enrollments
pub async fn get_enrollments(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    match s.registration.enrollments(&session) {
        Ok(enrollments) => (StatusCode::OK, Json(enrollments)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
