use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::{error, info};

use coursereg::catalog::CatalogClient;
use coursereg::config::AppConfig;
use coursereg::db::RegistrationDb;
use coursereg::registration::RegistrationService;
use coursereg::server::{self, SESSION_HEADER};
use coursereg::session::SessionManager;
use coursereg::types::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_file(Path::new(&path))
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => AppConfig::default(),
    };

    let level = config
        .log_level
        .0
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!(
        max_sections_per_course = config.cart.max_sections_per_course,
        catalog = %config.catalog.base_url,
        term = %config.catalog.term,
        "Starting course registration server"
    );

    let db = Arc::new(
        RegistrationDb::open(&config.database_path.0).context("Failed to open database")?,
    );
    let catalog = CatalogClient::new(&config.catalog, db.clone())
        .context("Failed to create catalog client")?;

    let state = Arc::new(AppState {
        db: db.clone(),
        sessions: SessionManager::new(config.session.secret.as_deref())
            .with_ttl(config.session.ttl())
            .with_login_secret(config.session.login_secret.as_deref()),
        registration: RegistrationService::new(db, config.cart.max_sections_per_course),
        catalog,
        started_at: Instant::now(),
    });

    if config.session.login_secret.is_none() {
        info!("No identity provider secret configured; only demo sessions are available");
    }

    let sweeper = state.clone();
    let sweep_interval = config.session.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            sweeper.reap_expired_sessions().await;
        }
    });

    let app = server::create_router(state);
    let address = format!("{}:{}", config.server.address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("Listening on http://{address} (session header: {SESSION_HEADER})");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
}
