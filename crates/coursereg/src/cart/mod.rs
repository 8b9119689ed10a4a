//! Per-session cart of candidate sections.
//!
//! The store enforces two invariants per session: a class number appears at
//! most once, and no more than `max_sections_per_course` entries share a
//! course code. It knows nothing about meeting times.

use crate::catalog::Section;
use crate::registration::RegistrationError;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

/// Default number of sections of one course a cart may hold.
pub const DEFAULT_MAX_SECTIONS_PER_COURSE: usize = 2;

/// A section held in a session's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartEntry {
    pub session_id: SessionId,
    pub section: Section,
    pub added_at: DateTime<Utc>,
}

impl CartEntry {
    pub fn class_number(&self) -> &str {
        &self.section.class_number
    }

    pub fn course_code(&self) -> &str {
        &self.section.course_code
    }
}

/// Thread-safe cart storage keyed by session.
///
/// Each session's entries sit behind one DashMap shard entry, so a single
/// `add` checks and inserts atomically for that session.
pub struct CartStore {
    carts: DashMap<SessionId, Vec<CartEntry>>,
    max_sections_per_course: usize,
}

impl CartStore {
    pub fn new(max_sections_per_course: usize) -> Self {
        Self {
            carts: DashMap::new(),
            max_sections_per_course,
        }
    }

    pub fn max_sections_per_course(&self) -> usize {
        self.max_sections_per_course
    }

    /// Adds a section to the session's cart.
    ///
    /// If the section is already held, the existing entry is returned
    /// unchanged.
    pub fn add(&self, session: &SessionId, section: &Section) -> Result<CartEntry, RegistrationError> {
        let mut cart = self.carts.entry(session.clone()).or_default();

        let held_for_course = cart
            .iter()
            .filter(|e| e.course_code() == section.course_code)
            .count();
        let already_held = cart.iter().find(|e| e.class_number() == section.class_number);

        if held_for_course >= self.max_sections_per_course && already_held.is_none() {
            debug!(
                session = %session,
                course = %section.course_code,
                "Rejecting section, per-course limit reached"
            );
            return Err(RegistrationError::CapacityExceeded {
                course_code: section.course_code.clone(),
                limit: self.max_sections_per_course,
            });
        }

        if let Some(existing) = already_held {
            debug!(session = %session, class_number = %section.class_number, "Section already in cart");
            return Ok(existing.clone());
        }

        let entry = CartEntry {
            session_id: session.clone(),
            section: section.clone(),
            added_at: Utc::now(),
        };
        cart.push(entry.clone());

        info!(
            session = %session,
            class_number = %section.class_number,
            course = %section.course_code,
            "Added section to cart"
        );
        Ok(entry)
    }

    /// Removes every entry with this class number. Returns whether anything
    /// was removed.
    pub fn remove(&self, session: &SessionId, class_number: &str) -> bool {
        let Some(mut cart) = self.carts.get_mut(session) else {
            return false;
        };

        let before = cart.len();
        cart.retain(|e| e.class_number() != class_number);
        let removed = cart.len() != before;

        if removed {
            info!(session = %session, class_number = %class_number, "Removed section from cart");
        }
        removed
    }

    /// Entries for the session in insertion order.
    pub fn list(&self, session: &SessionId) -> Vec<CartEntry> {
        self.carts
            .get(session)
            .map(|cart| cart.clone())
            .unwrap_or_default()
    }

    /// Drops the session's cart. Returns how many entries were removed.
    pub fn clear(&self, session: &SessionId) -> usize {
        let removed = self
            .carts
            .remove(session)
            .map(|(_, cart)| cart.len())
            .unwrap_or(0);
        if removed > 0 {
            info!(session = %session, removed, "Cleared cart");
        }
        removed
    }

    pub fn len(&self, session: &SessionId) -> usize {
        self.carts.get(session).map(|cart| cart.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, session: &SessionId) -> bool {
        self.len(session) == 0
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SECTIONS_PER_COURSE)
    }
}
