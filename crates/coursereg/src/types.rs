use std::sync::Arc;
use std::time::Instant;

use crate::catalog::CatalogClient;
use crate::db::RegistrationDb;
use crate::registration::RegistrationService;
use crate::session::SessionManager;

/// State shared by every request handler.
pub struct AppState {
    pub db: Arc<RegistrationDb>,
    pub sessions: SessionManager,
    pub registration: RegistrationService,
    pub catalog: CatalogClient,
    /// When the server started, for the health endpoint
    pub started_at: Instant,
}

impl AppState {
    /// Drops expired sessions together with their carts. Returns how many
    /// sessions were dropped.
    pub async fn reap_expired_sessions(&self) -> usize {
        let expired = self.sessions.reap_expired();
        for session in &expired {
            self.registration.end_session(session).await;
        }
        expired.len()
    }
}
