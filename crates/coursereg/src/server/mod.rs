use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware as mw, Router};

use crate::server::endpoints::{cart, catalog, registration, session, status};
use crate::server::middleware::*;
use crate::types::AppState;

mod endpoints;
mod middleware;
mod types;

pub use middleware::session_validator::{IDENTITY_SECRET_HEADER, SESSION_HEADER};

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Router whose endpoints require a session token
    let session_router = Router::new()
        .route("/session", get(session::get_session))
        .route("/session/logout", post(session::post_logout))
        .route("/cart", get(cart::get_cart))
        .route("/cart/add", post(cart::post_add))
        .route("/cart/remove", post(cart::post_remove))
        .route("/cart/validate", post(registration::post_validate))
        .route("/cart/enroll", post(registration::post_enroll))
        .route("/enrollments", get(registration::get_enrollments))
        .layer(mw::from_fn_with_state(
            app_state.clone(),
            session_validator::require_session,
        ));

    // Catalog router, no session needed
    let catalog_router = Router::new()
        .route("/catalog/search", get(catalog::get_search))
        .route(
            "/catalog/sections/:class_number",
            get(catalog::get_section),
        )
        .route(
            "/catalog/invalidate_cache",
            post(catalog::post_invalidate_cache),
        );

    Router::new()
        .route("/health", get(status::get_health))
        .route("/session/demo", post(session::post_demo_session))
        .route("/session/login", post(session::post_login))
        .merge(catalog_router)
        .merge(session_router)
        .with_state(app_state)
}
