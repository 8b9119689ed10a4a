/// Database module for catalog sections and committed enrollments

mod types;

pub use types::{DbSection, Enrollment};

use crate::catalog::Section;
use crate::session::UserId;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_registration.sql");

pub struct RegistrationDb {
    db: Mutex<Connection>,
}

impl RegistrationDb {
    /// Opens (or creates) the database at `db_path` and initializes the schema
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        info!("Opened registration database at {db_path}");
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied
        // transaction behind, so the connection stays usable.
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts or refreshes catalog sections
    pub fn upsert_sections(&self, sections: &[Section]) -> Result<usize> {
        if sections.is_empty() {
            return Ok(0);
        }

        let mut db = self.conn();
        let tx = db.transaction()?;
        let now = Utc::now();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sections (
                    class_number, course_code, course_name, section_code, instructor,
                    location, course_type, schedule, status, capacity, enrolled, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(class_number) DO UPDATE SET
                    course_code = excluded.course_code,
                    course_name = excluded.course_name,
                    section_code = excluded.section_code,
                    instructor = excluded.instructor,
                    location = excluded.location,
                    course_type = excluded.course_type,
                    schedule = excluded.schedule,
                    status = excluded.status,
                    capacity = excluded.capacity,
                    enrolled = excluded.enrolled,
                    updated_at = excluded.updated_at",
            )?;

            for section in sections {
                stmt.execute((
                    &section.class_number,
                    &section.course_code,
                    &section.course_name,
                    &section.section_code,
                    &section.instructor,
                    &section.location,
                    &section.course_type,
                    &section.schedule,
                    section.status.as_str(),
                    section.capacity,
                    section.enrolled,
                    now,
                ))?;
            }
        }
        tx.commit()?;

        Ok(sections.len())
    }

    /// Gets a section by its class number
    pub fn section(&self, class_number: &str) -> Result<Option<Section>> {
        let db = self.conn();
        db.query_row(
            "SELECT class_number, course_code, course_name, section_code, instructor,
                    location, course_type, schedule, status, capacity, enrolled, updated_at
             FROM sections
             WHERE class_number = ?",
            [class_number],
            |row| {
                Ok(DbSection {
                    class_number: row.get(0)?,
                    course_code: row.get(1)?,
                    course_name: row.get(2)?,
                    section_code: row.get(3)?,
                    instructor: row.get(4)?,
                    location: row.get(5)?,
                    course_type: row.get(6)?,
                    schedule: row.get(7)?,
                    status: row.get(8)?,
                    capacity: row.get(9)?,
                    enrolled: row.get(10)?,
                    updated_at: row.get(11)?,
                })
            },
        )
        .optional()
        .map(|row| row.map(Section::from))
    }

    /// Gets all enrollments for a user, oldest first
    pub fn enrollments_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT enrollment_id, user_id, course_code, course_name, class_number,
                    schedule, enrolled_at
             FROM enrollments
             WHERE user_id = ?
             ORDER BY enrollment_id",
        )?;

        let enrollments = stmt.query_map([user_id.as_str()], enrollment_from_row)?;
        enrollments.collect()
    }

    /// Records one enrollment per section in a single transaction.
    ///
    /// Either every section is enrolled or none is. Enrolling a user twice in
    /// the same course violates the `(user_id, course_code)` constraint and
    /// rolls the whole batch back.
    pub fn commit_enrollments(
        &self,
        user_id: &UserId,
        sections: &[Section],
        enrolled_at: DateTime<Utc>,
    ) -> Result<Vec<Enrollment>> {
        let mut db = self.conn();
        let tx = db.transaction()?;

        let mut committed = Vec::with_capacity(sections.len());
        for section in sections {
            tx.execute(
                "INSERT INTO enrollments (
                    user_id, course_code, course_name, class_number, schedule, enrolled_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    user_id.as_str(),
                    &section.course_code,
                    &section.course_name,
                    &section.class_number,
                    &section.schedule,
                    enrolled_at,
                ),
            )?;

            committed.push(Enrollment {
                enrollment_id: tx.last_insert_rowid(),
                user_id: user_id.clone(),
                course_code: section.course_code.clone(),
                course_name: section.course_name.clone(),
                class_number: section.class_number.clone(),
                schedule: section.schedule.clone(),
                enrolled_at,
            });
        }

        // Dropping `tx` on an early return above rolls back
        tx.commit()?;
        Ok(committed)
    }

    /// Counts all enrollments (for status reporting)
    pub fn enrollment_count(&self) -> Result<i64> {
        let db = self.conn();
        db.query_row("SELECT COUNT(*) FROM enrollments", [], |row| row.get(0))
    }
}

fn enrollment_from_row(row: &Row<'_>) -> Result<Enrollment> {
    Ok(Enrollment {
        enrollment_id: row.get(0)?,
        user_id: UserId::new(row.get::<_, String>(1)?),
        course_code: row.get(2)?,
        course_name: row.get(3)?,
        class_number: row.get(4)?,
        schedule: row.get(5)?,
        enrolled_at: row.get(6)?,
    })
}
