//! Error types for cart and enrollment operations.
//!
//! The `Display` text of each variant is shown to students verbatim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The session already holds the maximum number of sections of a course
    #[error("Maximum of {limit} sections per course allowed ({course_code})")]
    CapacityExceeded { course_code: String, limit: usize },

    /// More than one section of a course is queued for enrollment
    #[error("Multiple sections of {course_code} are in the cart; keep only one")]
    DuplicateCourse { course_code: String },

    /// Two sections meet at overlapping times
    #[error("Time conflict between {first} and {second}")]
    TimeConflict { first: String, second: String },

    #[error("Cart is empty")]
    EmptyCart,

    /// The user already has an enrollment in this course
    #[error("Already enrolled in {course_code}")]
    AlreadyEnrolled { course_code: String },

    #[error("Section {class_number} is closed")]
    SectionClosed { class_number: String },

    /// The session was logged out or expired
    #[error("Session has ended")]
    SessionEnded,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl RegistrationError {
    /// Returns true if the student can fix this by changing their cart.
    pub fn is_user_correctable(&self) -> bool {
        !matches!(
            self,
            RegistrationError::Storage(_) | RegistrationError::SessionEnded
        )
    }
}
