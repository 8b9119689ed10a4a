/// Configuration for the registration server
use crate::cart::DEFAULT_MAX_SECTIONS_PER_COURSE;
use crate::session::DEFAULT_SESSION_TTL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_path: DatabasePath,
    pub log_level: LogLevel,
    pub cart: CartConfig,
    pub catalog: CatalogConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabasePath(pub String);

impl Default for DatabasePath {
    fn default() -> Self {
        Self("registration.db".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

/// Cart limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CartConfig {
    /// How many sections of one course a cart may hold at once
    pub max_sections_per_course: usize,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            max_sections_per_course: DEFAULT_MAX_SECTIONS_PER_COURSE,
        }
    }
}

/// Upstream course-search feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    /// Term segment of the search path, e.g. "fa2022"
    pub term: String,
    /// Shorter queries are not sent upstream
    pub min_query_len: usize,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    /// Consecutive failures before searches are short-circuited
    pub failure_threshold: u32,
    pub recovery_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nyu.a1liu.com".to_string(),
            term: "fa2022".to_string(),
            min_query_len: 6,
            cache_ttl_secs: 5 * 60,
            request_timeout_secs: 10,
            failure_threshold: 5,
            recovery_secs: 30,
        }
    }
}

impl CatalogConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recovery_time(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Secret used to sign session tokens. A random one is generated per
    /// process when unset.
    pub secret: Option<String>,
    /// Shared secret the identity provider sends in `x-identity-secret` on
    /// login. Login is disabled when unset.
    pub login_secret: Option<String>,
    pub ttl_secs: u64,
    /// How often expired sessions are swept
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            login_secret: None,
            ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cart.max_sections_per_course == 0 {
            return Err(ConfigError::Invalid(
                "cart.max_sections_per_course must be at least 1".to_string(),
            ));
        }
        if self.session.ttl_secs == 0 || self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.ttl_secs and session.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.catalog.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("catalog.base_url is empty".to_string()));
        }
        if self.log_level.0.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level {:?}",
                self.log_level.0
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.cart.max_sections_per_course, 2);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.catalog.min_query_len, 6);
        assert_eq!(config.database_path.0, "registration.db");
        assert!(config.session.secret.is_none());
        assert!(config.session.login_secret.is_none());
        assert_eq!(config.session.ttl_secs, 8 * 60 * 60);
    }

    #[test]
    fn test_partial_override() {
        let config = AppConfig::from_json(
            r#"{ "cart": { "max_sections_per_course": 3 }, "server": { "port": 8080 }, "log_level": "debug" }"#,
        )
        .unwrap();
        assert_eq!(config.cart.max_sections_per_course, 3);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.address, "127.0.0.1");
        assert_eq!(config.log_level.0, "debug");
    }

    #[test]
    fn test_rejects_zero_section_limit() {
        assert!(matches!(
            AppConfig::from_json(r#"{ "cart": { "max_sections_per_course": 0 } }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_session_options() {
        let config = AppConfig::from_json(
            r#"{ "session": { "ttl_secs": 900, "login_secret": "idp-shared" } }"#,
        )
        .unwrap();
        assert_eq!(config.session.ttl(), Duration::from_secs(900));
        assert_eq!(config.session.login_secret.as_deref(), Some("idp-shared"));
        assert_eq!(config.session.sweep_interval_secs, 60);

        assert!(matches!(
            AppConfig::from_json(r#"{ "session": { "ttl_secs": 0 } }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(AppConfig::from_json(r#"{ "log_level": "loud" }"#).is_err());
    }
}
