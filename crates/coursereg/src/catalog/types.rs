/// Types for catalog data
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enrollment status of a section as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionStatus {
    Open,
    Waitlist,
    Closed,
}

impl SectionStatus {
    /// Reads a status from feed or database text. Anything unrecognized is
    /// treated as open.
    pub fn from_feed(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "closed" => SectionStatus::Closed,
            "waitlist" | "waitlisted" | "wait_list" => SectionStatus::Waitlist,
            _ => SectionStatus::Open,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Open => "Open",
            SectionStatus::Waitlist => "Waitlist",
            SectionStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schedulable offering of a course. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub class_number: String,
    pub course_code: String,
    pub course_name: String,
    pub section_code: String,
    pub instructor: String,
    pub location: String,
    pub course_type: String,
    /// Raw meeting time, e.g. "M W 12:00 PM - 1:15 PM" or "TBA"
    pub schedule: String,
    pub status: SectionStatus,
    /// Seat counts as last reported by the feed
    pub capacity: Option<u32>,
    pub enrolled: Option<u32>,
}

impl Section {
    /// Label used in user-facing messages, e.g. "Intro to CS (CSCI-UA 101)".
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.course_name, self.course_code)
    }
}

/// A catalog course with its sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub name: String,
    pub description: String,
    pub subject_code: String,
    pub sections: Vec<Section>,
}

/// Course as returned by the upstream search feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedCourse {
    pub dept_course_id: Option<serde_json::Value>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub subject_code: Option<String>,
    pub sections: Vec<FeedSection>,
}

/// Section as returned by the upstream search feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedSection {
    /// Usually a number in the feed, but occasionally a string
    pub registration_number: Option<serde_json::Value>,
    pub code: Option<String>,
    pub instructor: Option<String>,
    pub schedule: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub section_type: Option<String>,
    pub status: Option<String>,
    /// Seat capacity
    pub max_units: Option<serde_json::Value>,
    /// Seats taken
    pub min_units: Option<serde_json::Value>,
}
