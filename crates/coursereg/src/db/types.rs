/// Database types for registration data
use crate::catalog::{Section, SectionStatus};
use crate::session::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Row of the `sections` table.
#[derive(Debug, Clone)]
pub struct DbSection {
    pub class_number: String,
    pub course_code: String,
    pub course_name: String,
    pub section_code: String,
    pub instructor: String,
    pub location: String,
    pub course_type: String,
    pub schedule: String,
    pub status: String,
    pub capacity: Option<u32>,
    pub enrolled: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbSection> for Section {
    fn from(row: DbSection) -> Self {
        Section {
            class_number: row.class_number,
            course_code: row.course_code,
            course_name: row.course_name,
            section_code: row.section_code,
            instructor: row.instructor,
            location: row.location,
            course_type: row.course_type,
            schedule: row.schedule,
            status: SectionStatus::from_feed(&row.status),
            capacity: row.capacity,
            enrolled: row.enrolled,
        }
    }
}

/// A committed enrollment of a user in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enrollment {
    pub enrollment_id: i64,
    pub user_id: UserId,
    pub course_code: String,
    pub course_name: String,
    pub class_number: String,
    pub schedule: String,
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    /// Label used in user-facing messages.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.course_name, self.course_code)
    }
}
