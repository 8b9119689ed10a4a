use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::types::AppState;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    let enrollments = match s.db.enrollment_count() {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Health check could not count enrollments: {e}");
            None
        }
    };

    let health = if enrollments.is_some() { "ok" } else { "degraded" };

    (
        StatusCode::OK,
        Json(json!({
            "status": health,
            "uptime_secs": s.started_at.elapsed().as_secs(),
            "sessions": s.sessions.len(),
            "enrollments": enrollments,
            "cached_searches": s.catalog.cached_searches(),
            "catalog_failures": s.catalog.breaker_failures(),
        })),
    )
        .into_response()
}
