//! Upstream course catalog.
//!
//! The catalog feed is read-only and outside our control. Search never fails
//! from the caller's point of view: any upstream problem is logged and the
//! result is an empty list, which the UI shows as "no courses found".

mod cache;
mod error;
mod types;

pub use cache::{search_key, CircuitBreaker, SearchCache};
pub use error::CatalogError;
pub use types::*;

use crate::config::CatalogConfig;
use crate::db::RegistrationDb;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Defaults applied to missing feed fields.
const UNKNOWN: &str = "TBA";
const DEFAULT_COURSE_TYPE: &str = "In-Person";
const DEFAULT_SECTION_CODE: &str = "001";
const DEFAULT_DESCRIPTION: &str = "No description available";

pub struct CatalogClient {
    client: Client,
    base_url: Url,
    term: String,
    min_query_len: usize,
    cache: SearchCache,
    circuit_breaker: CircuitBreaker,
    db: Arc<RegistrationDb>,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig, db: Arc<RegistrationDb>) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(concat!("coursereg/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CatalogError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        // `Url::join` replaces the last path segment unless it ends in '/'
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
            term: config.term.clone(),
            min_query_len: config.min_query_len,
            cache: SearchCache::new(config.cache_ttl()),
            circuit_breaker: CircuitBreaker::new(config.failure_threshold, config.recovery_time()),
            db,
        })
    }

    /// Searches the catalog.
    ///
    /// Sections in the results are recorded so they can later be added to a
    /// cart by class number alone.
    pub async fn search(&self, query: &str) -> Vec<Course> {
        let key = search_key(query);
        if key.chars().count() < self.min_query_len {
            debug!(query = %query, "Search query too short, skipping upstream");
            return Vec::new();
        }

        if let Some(cached) = self.cache.get(&key) {
            debug!(query = %key, "Returning cached search results");
            return cached;
        }

        let correlation_id = generate_correlation_id();
        let start = Instant::now();
        match self.fetch(query.trim(), &correlation_id).await {
            Ok(courses) => {
                self.circuit_breaker.record_success();
                let sections: Vec<Section> = courses
                    .iter()
                    .flat_map(|c| c.sections.iter().cloned())
                    .collect();
                if let Err(e) = self.db.upsert_sections(&sections) {
                    warn!(correlation_id = %correlation_id, error = %e, "Failed to record catalog sections");
                }

                info!(
                    correlation_id = %correlation_id,
                    courses = courses.len(),
                    sections = sections.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Catalog search completed"
                );
                self.cache.insert(key, courses.clone());
                courses
            }
            Err(CatalogError::CircuitBreakerOpen) => {
                warn!(query = %key, "Catalog circuit breaker is open, returning no results");
                Vec::new()
            }
            Err(e) => {
                if e.is_upstream_failure() {
                    self.circuit_breaker.record_failure();
                }
                error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Catalog search failed"
                );
                Vec::new()
            }
        }
    }

    /// Looks up a section previously seen in search results.
    pub fn section(&self, class_number: &str) -> Result<Option<Section>, rusqlite::Error> {
        self.db.section(class_number)
    }

    /// Drops all cached search results.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_searches(&self) -> usize {
        self.cache.len()
    }

    pub fn breaker_failures(&self) -> u32 {
        self.circuit_breaker.failure_count()
    }

    fn search_url(&self, query: &str) -> Result<Url, CatalogError> {
        let mut url = self.base_url.join(&format!("api/search/{}", self.term))?;
        url.query_pairs_mut().append_pair("query", query);
        Ok(url)
    }

    async fn fetch(&self, query: &str, correlation_id: &str) -> Result<Vec<Course>, CatalogError> {
        if self.circuit_breaker.is_open() {
            return Err(CatalogError::CircuitBreakerOpen);
        }

        let url = self.search_url(query)?;
        info!(correlation_id = %correlation_id, "Fetching catalog: {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let raw: Vec<Value> = serde_json::from_str(&text)?;
        Ok(map_feed(raw))
    }
}

/// Maps raw feed items to courses, skipping items that do not look like a
/// course.
pub fn map_feed(raw: Vec<Value>) -> Vec<Course> {
    raw.into_iter()
        .filter_map(|item| match serde_json::from_value::<FeedCourse>(item) {
            Ok(course) => map_course(course),
            Err(e) => {
                debug!(error = %e, "Skipping malformed catalog item");
                None
            }
        })
        .collect()
}

fn map_course(raw: FeedCourse) -> Option<Course> {
    let Some(code) = value_to_string(raw.dept_course_id) else {
        debug!("Skipping catalog course without a code");
        return None;
    };
    let name = non_empty(raw.name).unwrap_or_else(|| code.clone());
    let subject_code = non_empty(raw.subject_code).unwrap_or_else(|| {
        code.split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string()
    });

    let sections = raw
        .sections
        .into_iter()
        .filter_map(|s| map_section(&code, &name, s))
        .collect();

    Some(Course {
        description: non_empty(raw.description).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        code,
        name,
        subject_code,
        sections,
    })
}

fn map_section(course_code: &str, course_name: &str, raw: FeedSection) -> Option<Section> {
    let Some(class_number) = value_to_string(raw.registration_number) else {
        debug!(course = %course_code, "Skipping section without a registration number");
        return None;
    };

    Some(Section {
        class_number,
        course_code: course_code.to_string(),
        course_name: course_name.to_string(),
        section_code: non_empty(raw.code).unwrap_or_else(|| DEFAULT_SECTION_CODE.to_string()),
        instructor: non_empty(raw.instructor).unwrap_or_else(|| UNKNOWN.to_string()),
        location: non_empty(raw.location).unwrap_or_else(|| UNKNOWN.to_string()),
        course_type: non_empty(raw.section_type).unwrap_or_else(|| DEFAULT_COURSE_TYPE.to_string()),
        schedule: non_empty(raw.schedule).unwrap_or_else(|| UNKNOWN.to_string()),
        status: raw
            .status
            .as_deref()
            .map(SectionStatus::from_feed)
            .unwrap_or(SectionStatus::Open),
        capacity: value_to_count(raw.max_units),
        enrolled: value_to_count(raw.min_units),
    })
}

fn value_to_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => non_empty(Some(s)),
        _ => None,
    }
}

/// Reads a non-negative count, truncating fractional feed values.
fn value_to_count(value: Option<Value>) -> Option<u32> {
    let n = value?.as_f64()?;
    (0.0..=u32::MAX as f64).contains(&n).then_some(n as u32)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Generates a unique correlation ID for request tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
