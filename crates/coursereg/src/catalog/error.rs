//! Error types for the upstream catalog feed.

use thiserror::Error;

/// Failures talking to the catalog feed. None of these reach callers of
/// [`super::CatalogClient::search`]; they are logged and the search comes
/// back empty.
#[derive(Debug, Error, Clone)]
pub enum CatalogError {
    /// Network/HTTP request failed
    #[error("Network error: {message}")]
    Network { message: String },

    /// Feed answered with a non-success status
    #[error("Catalog feed returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// Feed body was not the expected JSON
    #[error("Failed to decode catalog feed: {message}")]
    Decode { message: String },

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    UrlError { message: String },

    /// Circuit breaker is open due to repeated failures
    #[error("Circuit breaker open - too many recent failures")]
    CircuitBreakerOpen,
}

impl CatalogError {
    /// Returns true if this failure should count against the circuit breaker.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            CatalogError::Network { .. } | CatalogError::BadStatus { .. } | CatalogError::Decode { .. }
        )
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogError::Decode {
                message: err.to_string(),
            }
        } else {
            CatalogError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for CatalogError {
    fn from(err: url::ParseError) -> Self {
        CatalogError::UrlError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Decode {
            message: err.to_string(),
        }
    }
}
