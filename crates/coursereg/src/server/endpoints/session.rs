//! Session endpoints.
//!
//! Logging in does not authenticate the student; the identity provider in
//! front of this service does that and proves itself with a shared secret.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::server::middleware::session_validator::IDENTITY_SECRET_HEADER;
use crate::server::types::ApiErrorType;
use crate::session::{Session, UserId};
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// POST /session/demo
pub async fn post_demo_session(State(s): State<Arc<AppState>>) -> Response {
    let issued = s.sessions.create_demo();
    (StatusCode::CREATED, Json(issued)).into_response()
}

/// POST /session/login
pub async fn post_login(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Response {
    let presented = headers
        .get(IDENTITY_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = s.sessions.authorize_login(presented) {
        warn!("Refusing login: {e}");
        return ApiErrorType::from(e).into_response();
    }

    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return ApiErrorType::from((StatusCode::BAD_REQUEST, "user_id is required", None))
            .into_response();
    }

    let issued = s.sessions.login(UserId::new(user_id), body.name);
    (StatusCode::CREATED, Json(issued)).into_response()
}

/// GET /session
pub async fn get_session(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    let phase = s.registration.phase(&session.id);
    let cart_size = s.registration.cart(&session).await.len();
    (
        StatusCode::OK,
        Json(json!({
            "session": session,
            "phase": phase,
            "cart_size": cart_size,
        })),
    )
        .into_response()
}

/// POST /session/logout
///
/// Ends the session and drops everything in its cart.
pub async fn post_logout(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    s.sessions.revoke(&session.id);
    let dropped = s.registration.end_session(&session).await;
    info!(session = %session.id, dropped, "Session ended");

    (StatusCode::OK, Json(json!({ "logged_out": true, "cart_entries_removed": dropped })))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogClient;
    use crate::config::CatalogConfig;
    use crate::db::RegistrationDb;
    use crate::registration::RegistrationService;
    use crate::session::SessionManager;
    use axum::http::HeaderValue;
    use std::time::Instant;

    fn state(login_secret: Option<&str>) -> Arc<AppState> {
        let db = Arc::new(RegistrationDb::open_in_memory().unwrap());
        Arc::new(AppState {
            db: db.clone(),
            sessions: SessionManager::new(Some("k")).with_login_secret(login_secret),
            registration: RegistrationService::new(db.clone(), 2),
            catalog: CatalogClient::new(&CatalogConfig::default(), db).unwrap(),
            started_at: Instant::now(),
        })
    }

    fn login_body() -> Json<LoginRequest> {
        Json(LoginRequest {
            user_id: "n12345".to_string(),
            name: None,
        })
    }

    #[tokio::test]
    async fn test_login_without_identity_secret_is_refused() {
        let disabled = state(None);
        let response = post_login(State(disabled.clone()), HeaderMap::new(), login_body()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(disabled.sessions.is_empty());

        let s = state(Some("idp-shared"));
        let response = post_login(State(s.clone()), HeaderMap::new(), login_body()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_SECRET_HEADER, HeaderValue::from_static("guess"));
        let response = post_login(State(s.clone()), headers, login_body()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(s.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_login_with_identity_secret() {
        let s = state(Some("idp-shared"));
        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_SECRET_HEADER, HeaderValue::from_static("idp-shared"));

        let response = post_login(State(s.clone()), headers, login_body()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(s.sessions.len(), 1);
    }
}
