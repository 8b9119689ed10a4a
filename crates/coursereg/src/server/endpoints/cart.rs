use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::server::types::ApiErrorType;
use crate::session::Session;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct ClassNumberBody {
    pub class_number: String,
}

/// GET /cart
pub async fn get_cart(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    let entries = s.registration.cart(&session).await;
    (StatusCode::OK, Json(entries)).into_response()
}

/// POST /cart/add
///
/// The section is resolved server-side from the catalog records, so clients
/// cannot submit their own meeting times.
pub async fn post_add(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<ClassNumberBody>,
) -> Response {
    info!(session = %session.id, "POST /cart/add {}", body.class_number);

    let section = match s.catalog.section(&body.class_number) {
        Ok(Some(section)) => section,
        Ok(None) => {
            return ApiErrorType::from((
                StatusCode::NOT_FOUND,
                "Section not found",
                Some(format!(
                    "No section with class number {}; search for it first",
                    body.class_number
                )),
            ))
            .into_response()
        }
        Err(e) => {
            error!("Failed to look up section {}: {e}", body.class_number);
            return ApiErrorType::from((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to look up section",
                Some(e.to_string()),
            ))
            .into_response();
        }
    };

    match s.registration.add_to_cart(&session, &section).await {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// POST /cart/remove
pub async fn post_remove(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(body): Json<ClassNumberBody>,
) -> Response {
    let removed = s
        .registration
        .remove_from_cart(&session, &body.class_number)
        .await;
    (StatusCode::OK, Json(json!({ "removed": removed }))).into_response()
}
