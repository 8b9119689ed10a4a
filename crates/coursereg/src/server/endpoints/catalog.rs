use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::server::types::ApiErrorType;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// GET /catalog/search?q=...
///
/// Always 200; an unreachable feed yields an empty list.
pub async fn get_search(
    State(s): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    info!("GET /catalog/search?q={}", params.q);
    let courses = s.catalog.search(&params.q).await;
    (StatusCode::OK, Json(courses)).into_response()
}

/// GET /catalog/sections/:class_number
pub async fn get_section(
    Path(class_number): Path<String>,
    State(s): State<Arc<AppState>>,
) -> Response {
    match s.catalog.section(&class_number) {
        Ok(Some(section)) => (StatusCode::OK, Json(section)).into_response(),
        Ok(None) => ApiErrorType::from((
            StatusCode::NOT_FOUND,
            "Section not found",
            Some(format!("No section with class number {class_number}")),
        ))
        .into_response(),
        Err(e) => {
            error!("Failed to look up section {class_number}: {e}");
            ApiErrorType::from((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to look up section",
                Some(e.to_string()),
            ))
            .into_response()
        }
    }
}

/// POST /catalog/invalidate_cache
pub async fn post_invalidate_cache(State(s): State<Arc<AppState>>) -> Response {
    info!("POST /catalog/invalidate_cache");
    s.catalog.invalidate_cache();
    (StatusCode::OK, Json(json!({ "message": "Cache invalidated" }))).into_response()
}
