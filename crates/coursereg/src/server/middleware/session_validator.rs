use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::server::types::ApiErrorType;
use crate::session::SessionError;
use crate::types::AppState;

/// Header carrying the token issued by `/session/demo` or `/session/login`.
pub const SESSION_HEADER: &str = "x-session-token";

/// Header the identity provider uses to present its shared secret on login.
pub const IDENTITY_SECRET_HEADER: &str = "x-identity-secret";

/// Resolves the request's session token and makes the [`Session`] available
/// to handlers as an `Extension`. Requests without a valid token are
/// rejected with 401. Hitting an expired session sweeps all expired ones.
///
/// [`Session`]: crate::session::Session
pub async fn require_session(
    State(s): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = match session_token(req.headers())
        .ok_or(SessionError::Missing)
        .and_then(|token| s.sessions.resolve(token))
    {
        Ok(session) => session,
        Err(e) => {
            if e == SessionError::Expired {
                let reaped = s.reap_expired_sessions().await;
                debug!(reaped, "Swept expired sessions");
            }
            debug!("Rejecting request to {}: {e}", req.uri().path());
            return ApiErrorType::from(e).into_response();
        }
    };

    req.extensions_mut().insert(session);
    next.run(req).await
}

/// Reads the token from `x-session-token`, falling back to a bearer
/// `Authorization` header.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value);
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def"),
        );
        assert_eq!(session_token(&headers), Some("abc.def"));

        headers.insert(SESSION_HEADER, HeaderValue::from_static("123.456"));
        assert_eq!(session_token(&headers), Some("123.456"));
    }
}
