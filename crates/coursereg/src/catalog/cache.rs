//! TTL cache for catalog searches and a breaker for the upstream feed.

use super::types::Course;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Normalizes a search query into a cache key.
pub fn search_key(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Clone)]
struct CachedSearch {
    courses: Vec<Course>,
    cached_at: Instant,
}

/// Thread-safe cache of search results keyed by normalized query.
pub struct SearchCache {
    entries: DashMap<String, CachedSearch>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Gets cached results if present and fresh. Stale entries are dropped.
    pub fn get(&self, key: &str) -> Option<Vec<Course>> {
        let entry = self.entries.get(key)?;
        if entry.cached_at.elapsed() < self.ttl {
            return Some(entry.courses.clone());
        }

        drop(entry);
        self.entries.remove(key);
        None
    }

    /// Stores results, first evicting every stale entry.
    pub fn insert(&self, key: String, courses: Vec<Course>) {
        self.cleanup_expired();
        self.entries.insert(
            key,
            CachedSearch {
                courses,
                cached_at: Instant::now(),
            },
        );
    }

    /// Removes stale entries. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries, including stale ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Opens after `threshold` consecutive failures and stays open for
/// `recovery_time` after the most recent one.
pub struct CircuitBreaker {
    failures: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
    threshold: u32,
    recovery_time: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            last_failure: Mutex::new(None),
            threshold,
            recovery_time,
        }
    }

    /// Returns true while requests should be short-circuited.
    pub fn is_open(&self) -> bool {
        if self.failures.load(Ordering::Relaxed) < self.threshold {
            return false;
        }

        let last = *self.last_failure.lock().unwrap_or_else(|e| e.into_inner());
        match last {
            Some(at) if at.elapsed() > self.recovery_time => {
                self.reset();
                false
            }
            _ => true,
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::Relaxed);
        *self.last_failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}
