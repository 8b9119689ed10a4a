//! Cart validation and enrollment.
//!
//! The service owns the cart store and talks to the enrollment database.
//! Every operation on a session runs under that session's lock, so a
//! validation always sees the cart that an enrollment in the same call
//! commits. Enrollment additionally holds a per-user lock, taken after the
//! session lock, so two sessions of one student commit one at a time.
//!
//! Once a session has ended, operations on it are refused, including ones
//! that were already waiting on its lock.

mod error;
mod types;

pub use error::RegistrationError;
pub use types::*;

use crate::cart::{CartEntry, CartStore};
use crate::catalog::{Section, SectionStatus};
use crate::db::{Enrollment, RegistrationDb};
use crate::schedule::{self, ParsedSchedule};
use crate::session::{Session, SessionId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

pub struct RegistrationService {
    cart: CartStore,
    db: Arc<RegistrationDb>,
    /// Per-session locks serializing cart mutation, validation and enrollment
    session_locks: DashMap<SessionId, Arc<Mutex<()>>>,
    /// Serializes enrollment commits across sessions of one user
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    phases: DashMap<SessionId, RegistrationPhase>,
    /// Ended sessions, kept until the session's own expiry
    ended: DashMap<SessionId, DateTime<Utc>>,
}

impl RegistrationService {
    pub fn new(db: Arc<RegistrationDb>, max_sections_per_course: usize) -> Self {
        Self {
            cart: CartStore::new(max_sections_per_course),
            db,
            session_locks: DashMap::new(),
            user_locks: DashMap::new(),
            phases: DashMap::new(),
            ended: DashMap::new(),
        }
    }

    /// Gets or creates the lock for the given session.
    fn session_lock(&self, id: &SessionId) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn user_lock(&self, id: &UserId) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn ensure_live(&self, session: &Session) -> Result<(), RegistrationError> {
        if session.is_expired(Utc::now()) || self.ended.contains_key(&session.id) {
            return Err(RegistrationError::SessionEnded);
        }
        Ok(())
    }

    /// Takes the session lock, refusing sessions that ended before or while
    /// waiting for it.
    async fn lock_live(&self, session: &Session) -> Result<OwnedMutexGuard<()>, RegistrationError> {
        self.ensure_live(session)?;
        let guard = self.session_lock(&session.id).lock_owned().await;
        self.ensure_live(session)?;
        Ok(guard)
    }

    fn set_phase(&self, id: &SessionId, phase: RegistrationPhase) {
        self.phases.insert(id.clone(), phase);
    }

    /// Current phase of the session; `Idle` if it has done nothing yet.
    pub fn phase(&self, id: &SessionId) -> RegistrationPhase {
        self.phases
            .get(id)
            .map(|p| *p)
            .unwrap_or(RegistrationPhase::Idle)
    }

    /// Adds a section to the session's cart.
    ///
    /// Closed sections and courses the student is already enrolled in are
    /// rejected before the cart's own limits are checked.
    pub async fn add_to_cart(
        &self,
        session: &Session,
        section: &Section,
    ) -> Result<CartEntry, RegistrationError> {
        let _guard = self.lock_live(session).await?;

        if section.status == SectionStatus::Closed {
            return Err(RegistrationError::SectionClosed {
                class_number: section.class_number.clone(),
            });
        }

        let enrolled = self.db.enrollments_for_user(&session.user_id)?;
        if enrolled.iter().any(|e| e.course_code == section.course_code) {
            return Err(RegistrationError::AlreadyEnrolled {
                course_code: section.course_code.clone(),
            });
        }

        let entry = self.cart.add(&session.id, section)?;
        self.set_phase(&session.id, RegistrationPhase::Idle);
        Ok(entry)
    }

    /// Removes a section from the cart. Returns whether it was held.
    pub async fn remove_from_cart(&self, session: &Session, class_number: &str) -> bool {
        let Ok(_guard) = self.lock_live(session).await else {
            return false;
        };

        let removed = self.cart.remove(&session.id, class_number);
        if removed {
            self.set_phase(&session.id, RegistrationPhase::Idle);
        }
        removed
    }

    pub async fn cart(&self, session: &Session) -> Vec<CartEntry> {
        match self.lock_live(session).await {
            Ok(_guard) => self.cart.list(&session.id),
            Err(_) => Vec::new(),
        }
    }

    /// Checks the cart for duplicates and time conflicts, including conflicts
    /// with courses the student is already enrolled in.
    pub async fn validate(&self, session: &Session) -> ValidationResult {
        let _guard = match self.lock_live(session).await {
            Ok(guard) => guard,
            Err(e) => return ValidationResult::invalid(e.to_string()),
        };

        match self.run_validation(session) {
            Ok(entries) => ValidationResult::ok(format!(
                "Schedule is valid: {} section(s) with no conflicts",
                entries.len()
            )),
            Err(e) => ValidationResult::invalid(e.to_string()),
        }
    }

    /// Validates the cart again and, if it passes, enrolls every section and
    /// empties the cart.
    ///
    /// Enrollment is all-or-nothing: on any failure no enrollment is recorded
    /// and the cart is left as it was.
    pub async fn enroll(&self, session: &Session) -> EnrollResult {
        let _guard = match self.lock_live(session).await {
            Ok(guard) => guard,
            Err(e) => return EnrollResult::failed(e.to_string()),
        };

        let user_lock = self.user_lock(&session.user_id);
        let result = {
            let _user_guard = user_lock.lock().await;
            self.enroll_locked(session)
        };
        drop(user_lock);
        self.user_locks
            .remove_if(&session.user_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Runs under both the session and the user lock.
    fn enroll_locked(&self, session: &Session) -> EnrollResult {
        let entries = match self.run_validation(session) {
            Ok(entries) => entries,
            Err(e) => return EnrollResult::failed(e.to_string()),
        };

        self.set_phase(&session.id, RegistrationPhase::Enrolling);
        let sections: Vec<Section> = entries.into_iter().map(|e| e.section).collect();

        match self
            .db
            .commit_enrollments(&session.user_id, &sections, Utc::now())
        {
            Ok(enrolled) => {
                self.cart.clear(&session.id);
                self.set_phase(&session.id, RegistrationPhase::Enrolled);
                info!(
                    session = %session.id,
                    user = %session.user_id,
                    courses = enrolled.len(),
                    "Enrollment committed"
                );
                EnrollResult::enrolled(enrolled)
            }
            Err(e) => {
                self.set_phase(&session.id, RegistrationPhase::Failed);
                error!(session = %session.id, error = %e, "Enrollment commit failed");
                EnrollResult::failed(RegistrationError::from(e).to_string())
            }
        }
    }

    /// Committed enrollments of the session's user.
    pub fn enrollments(&self, session: &Session) -> Result<Vec<Enrollment>, RegistrationError> {
        Ok(self.db.enrollments_for_user(&session.user_id)?)
    }

    /// Tears down all per-session state. Returns the number of cart entries
    /// dropped.
    pub async fn end_session(&self, session: &Session) -> usize {
        let lock = self.session_lock(&session.id);
        let removed = {
            let _guard = lock.lock().await;
            self.ended.insert(session.id.clone(), session.expires_at);
            self.phases.remove(&session.id);
            self.cart.clear(&session.id)
        };
        drop(lock);
        self.session_locks.remove(&session.id);

        // Expired sessions are refused on their own
        let now = Utc::now();
        self.ended.retain(|_, expires_at| *expires_at > now);
        removed
    }

    /// Runs validation under an already-held session lock, tracking phase.
    fn run_validation(&self, session: &Session) -> Result<Vec<CartEntry>, RegistrationError> {
        self.set_phase(&session.id, RegistrationPhase::Validating);

        let result = self.check_cart(session);
        match &result {
            Ok(_) => self.set_phase(&session.id, RegistrationPhase::Valid),
            Err(e) => {
                self.set_phase(&session.id, RegistrationPhase::Invalid);
                if e.is_user_correctable() {
                    info!(session = %session.id, reason = %e, "Cart failed validation");
                } else {
                    warn!(session = %session.id, error = %e, "Cart validation could not complete");
                }
            }
        }
        result
    }

    fn check_cart(&self, session: &Session) -> Result<Vec<CartEntry>, RegistrationError> {
        let entries = self.cart.list(&session.id);
        if entries.is_empty() {
            return Err(RegistrationError::EmptyCart);
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.course_code()) {
                return Err(RegistrationError::DuplicateCourse {
                    course_code: entry.course_code().to_string(),
                });
            }
        }

        let enrolled = self.db.enrollments_for_user(&session.user_id)?;
        if let Some(entry) = entries
            .iter()
            .find(|e| enrolled.iter().any(|x| x.course_code == e.course_code()))
        {
            return Err(RegistrationError::AlreadyEnrolled {
                course_code: entry.course_code().to_string(),
            });
        }

        let cart_schedules: Vec<ParsedSchedule> = entries
            .iter()
            .map(|e| schedule::parse(&e.section.schedule))
            .collect();
        if let Some((i, j)) = schedule::find_conflict(&cart_schedules) {
            return Err(RegistrationError::TimeConflict {
                first: entries[i].section.display_name(),
                second: entries[j].section.display_name(),
            });
        }

        // Existing enrollments only matter against new cart entries; a clash
        // between two committed courses is not the cart's problem.
        let enrolled_schedules: Vec<ParsedSchedule> =
            enrolled.iter().map(|e| schedule::parse(&e.schedule)).collect();
        for (i, held) in cart_schedules.iter().enumerate() {
            for (j, committed) in enrolled_schedules.iter().enumerate() {
                if schedule::conflicts(held, committed) {
                    return Err(RegistrationError::TimeConflict {
                        first: entries[i].section.display_name(),
                        second: enrolled[j].display_name(),
                    });
                }
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::tests::section;
    use crate::session::{SessionManager, UserId};
    use std::time::Duration;

    fn service() -> RegistrationService {
        let db = Arc::new(RegistrationDb::open_in_memory().unwrap());
        RegistrationService::new(db, 2)
    }

    fn named(class_number: &str, code: &str, name: &str, schedule: &str) -> Section {
        let mut s = section(class_number, code, schedule);
        s.course_name = name.to_string();
        s
    }

    fn cs101(class_number: &str) -> Section {
        named(class_number, "CSCI-UA 101", "Intro to Computer Science", "M W 12:00 PM - 1:15 PM")
    }

    #[tokio::test]
    async fn test_overlapping_cart_is_invalid() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;

        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();
        svc.add_to_cart(
            &session,
            &named("2001", "MATH-UA 120", "Discrete Mathematics", "M W 12:30 PM - 1:45 PM"),
        )
        .await
        .unwrap();

        let result = svc.validate(&session).await;
        assert!(!result.valid);
        let error = result.error.unwrap();
        assert!(error.contains("Intro to Computer Science"), "{error}");
        assert!(error.contains("Discrete Mathematics"), "{error}");
        assert_eq!(svc.phase(&session.id), RegistrationPhase::Invalid);
    }

    #[tokio::test]
    async fn test_disjoint_days_cart_is_valid() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;

        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();
        svc.add_to_cart(
            &session,
            &named("2001", "MATH-UA 120", "Discrete Mathematics", "T Th 12:00 PM - 1:15 PM"),
        )
        .await
        .unwrap();

        let result = svc.validate(&session).await;
        assert!(result.valid, "{result:?}");
        assert!(result.error.is_none());
        assert_eq!(svc.phase(&session.id), RegistrationPhase::Valid);
    }

    #[tokio::test]
    async fn test_two_sections_of_one_course_is_duplicate() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;

        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();
        let mut other = cs101("1002");
        other.schedule = "T Th 3:30 PM - 4:45 PM".to_string();
        svc.add_to_cart(&session, &other).await.unwrap();

        let result = svc.validate(&session).await;
        assert!(!result.valid);
        assert_eq!(
            result.error.unwrap(),
            RegistrationError::DuplicateCourse {
                course_code: "CSCI-UA 101".to_string()
            }
            .to_string()
        );
    }

    #[tokio::test]
    async fn test_empty_cart() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;

        assert_eq!(
            svc.validate(&session).await,
            ValidationResult::invalid("Cart is empty")
        );
        let result = svc.enroll(&session).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Cart is empty"));
        assert!(svc.cart(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_leaves_cart_unchanged() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;
        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();

        assert!(!svc.remove_from_cart(&session, "4242").await);
        assert_eq!(svc.cart(&session).await.len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_commits_and_clears_cart() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;
        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();
        svc.add_to_cart(&session, &section("3001", "PHYS-UA 11", "TBA"))
            .await
            .unwrap();

        let result = svc.enroll(&session).await;
        assert!(result.success, "{result:?}");
        assert_eq!(result.enrolled.len(), 2);
        assert!(svc.cart(&session).await.is_empty());
        assert_eq!(svc.enrollments(&session).unwrap().len(), 2);
        assert_eq!(svc.phase(&session.id), RegistrationPhase::Enrolled);
    }

    #[tokio::test]
    async fn test_enrolled_course_blocks_add_and_conflicts() {
        let svc = service();
        let sessions = SessionManager::new(Some("k"));
        let user = UserId::new("n100");

        let first = sessions.login(user.clone(), None).session;
        svc.add_to_cart(&first, &cs101("1001")).await.unwrap();
        assert!(svc.enroll(&first).await.success);

        // A later session of the same student
        let second = sessions.login(user, None).session;
        assert!(matches!(
            svc.add_to_cart(&second, &cs101("1002")).await,
            Err(RegistrationError::AlreadyEnrolled { .. })
        ));

        svc.add_to_cart(
            &second,
            &named("2001", "MATH-UA 120", "Discrete Mathematics", "W 1:00 PM - 2:00 PM"),
        )
        .await
        .unwrap();
        let result = svc.validate(&second).await;
        assert!(!result.valid);
        let error = result.error.unwrap();
        assert!(error.contains("Discrete Mathematics"), "{error}");
        assert!(error.contains("Intro to Computer Science"), "{error}");

        // Back-to-back with the enrolled course is fine
        svc.remove_from_cart(&second, "2001").await;
        svc.add_to_cart(
            &second,
            &named("2002", "MATH-UA 120", "Discrete Mathematics", "M W 1:15 PM - 2:30 PM"),
        )
        .await
        .unwrap();
        assert!(svc.validate(&second).await.valid);
    }

    #[tokio::test]
    async fn test_closed_section_is_rejected() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;
        let mut closed = cs101("1001");
        closed.status = SectionStatus::Closed;

        assert!(matches!(
            svc.add_to_cart(&session, &closed).await,
            Err(RegistrationError::SectionClosed { .. })
        ));
        assert!(svc.cart(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_course_enrolled_from_other_session_blocks_enroll() {
        let svc = service();
        let sessions = SessionManager::new(Some("k"));
        let user = UserId::new("n200");
        let a = sessions.login(user.clone(), None).session;
        let b = sessions.login(user, None).session;

        // Both sessions of one student hold the same course
        svc.add_to_cart(&a, &cs101("1001")).await.unwrap();
        svc.add_to_cart(&b, &cs101("1002")).await.unwrap();
        svc.add_to_cart(&b, &section("3001", "PHYS-UA 11", "TBA"))
            .await
            .unwrap();

        assert!(svc.enroll(&a).await.success);
        let result = svc.enroll(&b).await;
        assert!(!result.success);
        assert_eq!(svc.cart(&b).await.len(), 2);
        assert_eq!(svc.enrollments(&b).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_double_submit_enrolls_once() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;
        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();

        let (r1, r2) = futures::future::join(svc.enroll(&session), svc.enroll(&session)).await;
        let successes = [&r1, &r2].iter().filter(|r| r.success).count();
        assert_eq!(successes, 1);

        let failed = if r1.success { r2 } else { r1 };
        assert_eq!(failed.error.as_deref(), Some("Cart is empty"));
        assert_eq!(svc.enrollments(&session).unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_respect_course_limit() {
        let svc = Arc::new(service());
        let session = SessionManager::new(Some("k")).create_demo().session;

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let svc = svc.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    svc.add_to_cart(&session, &cs101(&format!("10{n:02}"))).await
                })
            })
            .collect();

        let mut added = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                added += 1;
            }
        }
        assert_eq!(added, 2);
        assert_eq!(svc.cart(&session).await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_user_sessions_commit_one_at_a_time() {
        for _ in 0..50 {
            let svc = Arc::new(service());
            let sessions = SessionManager::new(Some("k"));
            let user = UserId::new("n300");
            let a = sessions.login(user.clone(), None).session;
            let b = sessions.login(user.clone(), None).session;

            svc.add_to_cart(
                &a,
                &named("1001", "CSCI-UA 101", "Intro to Computer Science", "M 9:00 AM - 10:00 AM"),
            )
            .await
            .unwrap();
            svc.add_to_cart(
                &b,
                &named("2001", "MATH-UA 120", "Discrete Mathematics", "M 9:30 AM - 10:30 AM"),
            )
            .await
            .unwrap();

            let handles: Vec<_> = [a, b]
                .into_iter()
                .map(|session| {
                    let svc = svc.clone();
                    tokio::spawn(async move { svc.enroll(&session).await })
                })
                .collect();

            let mut successes = 0;
            for handle in handles {
                if handle.await.unwrap().success {
                    successes += 1;
                }
            }
            assert_eq!(successes, 1);
            assert_eq!(svc.db.enrollments_for_user(&user).unwrap().len(), 1);
            assert!(svc.user_locks.is_empty());
        }
    }

    #[tokio::test]
    async fn test_end_session_clears_state() {
        let svc = service();
        let session = SessionManager::new(Some("k")).create_demo().session;
        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();
        svc.validate(&session).await;

        assert_eq!(svc.end_session(&session).await, 1);
        assert!(svc.cart(&session).await.is_empty());
        assert_eq!(svc.phase(&session.id), RegistrationPhase::Idle);
        assert!(matches!(
            svc.add_to_cart(&session, &cs101("1002")).await,
            Err(RegistrationError::SessionEnded)
        ));
        assert!(!svc.enroll(&session).await.success);
        assert!(svc.session_locks.is_empty());
    }

    #[tokio::test]
    async fn test_add_queued_behind_end_session_is_refused() {
        let svc = Arc::new(service());
        let session = SessionManager::new(Some("k")).create_demo().session;
        svc.add_to_cart(&session, &cs101("1001")).await.unwrap();

        let lock = svc.session_lock(&session.id);
        let guard = lock.lock().await;

        let ending = {
            let svc = svc.clone();
            let session = session.clone();
            tokio::spawn(async move { svc.end_session(&session).await })
        };
        tokio::task::yield_now().await;

        let adding = {
            let svc = svc.clone();
            let session = session.clone();
            tokio::spawn(async move {
                let math = named("2001", "MATH-UA 120", "Discrete Mathematics", "T 9:00 AM - 10:00 AM");
                svc.add_to_cart(&session, &math).await
            })
        };
        tokio::task::yield_now().await;

        drop(guard);
        drop(lock);

        assert_eq!(ending.await.unwrap(), 1);
        assert!(matches!(
            adding.await.unwrap(),
            Err(RegistrationError::SessionEnded)
        ));
        assert!(svc.cart.list(&session.id).is_empty());
        assert!(svc.session_locks.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_is_refused() {
        let svc = service();
        let session = SessionManager::new(Some("k"))
            .with_ttl(Duration::ZERO)
            .create_demo()
            .session;

        assert!(matches!(
            svc.add_to_cart(&session, &cs101("1001")).await,
            Err(RegistrationError::SessionEnded)
        ));
        assert!(svc.session_locks.is_empty());
    }
}
