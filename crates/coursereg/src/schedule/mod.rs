//! Meeting-time parsing.
//!
//! Upstream sections carry schedules as free text, e.g. `M W 12:00 PM - 1:15 PM`
//! or `TBA`. This module turns that text into a [`ParsedSchedule`] that the
//! conflict detector can reason about.

pub mod conflict;

pub use conflict::{conflicts, find_conflict, has_conflict};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Sentinel used by the catalog for sections without a meeting time.
pub const TBA: &str = "TBA";

/// Separator between the start and end time.
const RANGE_SEPARATOR: &str = " - ";

static TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})\s*([AaPp][Mm])$").unwrap());

/// Day of the week a section meets on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Weekday {
    /// Maps a catalog day token to a weekday. `T` is Tuesday and `Th` is
    /// Thursday.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "M" => Some(Weekday::Mon),
            "T" => Some(Weekday::Tue),
            "W" => Some(Weekday::Wed),
            "Th" => Some(Weekday::Thu),
            "F" => Some(Weekday::Fri),
            "Sa" => Some(Weekday::Sat),
            _ => None,
        }
    }
}

/// A time-of-day range in minutes since midnight, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    /// Whether two ranges share at least one minute.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", format_minutes(self.start), format_minutes(self.end))
    }
}

/// Structured form of a section's meeting time.
///
/// An empty day set means the section is unscheduled (or its schedule could
/// not be read) and never conflicts with anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSchedule {
    pub days: BTreeSet<Weekday>,
    pub time: Option<TimeRange>,
}

impl ParsedSchedule {
    /// The unscheduled schedule.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if this schedule can never conflict.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty() || self.time.is_none()
    }
}

/// Reasons a schedule string could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleParseError {
    #[error("schedule is blank or has no time component: {text:?}")]
    Unparseable { text: String },

    #[error("schedule has no time range: {text:?}")]
    MissingTimeRange { text: String },

    #[error("invalid time of day: {component:?}")]
    InvalidTime { component: String },

    #[error("end time {end} is not after start time {start}")]
    InvertedRange { start: String, end: String },
}

/// Parses a schedule string, degrading every anomaly to an empty schedule.
///
/// Never fails. Anomalies are logged so bad upstream data is visible without
/// breaking validation.
pub fn parse(text: &str) -> ParsedSchedule {
    match parse_strict(text) {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!(schedule = %text, error = %e, "Schedule parse anomaly, treating as unscheduled");
            ParsedSchedule::empty()
        }
    }
}

/// Parses a schedule string, reporting anomalies.
///
/// `TBA` is not an anomaly and yields `Ok` with an empty schedule.
pub fn parse_strict(text: &str) -> Result<ParsedSchedule, ScheduleParseError> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case(TBA) {
        return Ok(ParsedSchedule::empty());
    }

    if trimmed.is_empty() || !trimmed.contains(' ') {
        return Err(ScheduleParseError::Unparseable {
            text: text.to_string(),
        });
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let boundary = tokens
        .iter()
        .position(|t| t.contains(':'))
        .ok_or_else(|| ScheduleParseError::MissingTimeRange {
            text: text.to_string(),
        })?;

    let mut days = BTreeSet::new();
    for token in &tokens[..boundary] {
        match Weekday::from_token(token) {
            Some(day) => {
                days.insert(day);
            }
            None => debug!(token = %token, "Dropping unrecognized day token"),
        }
    }

    let range_text = tokens[boundary..].join(" ");
    let (start_text, end_text) = range_text.split_once(RANGE_SEPARATOR).ok_or_else(|| {
        ScheduleParseError::MissingTimeRange {
            text: text.to_string(),
        }
    })?;

    let start = parse_time(start_text)?;
    let end = parse_time(end_text)?;
    if end <= start {
        return Err(ScheduleParseError::InvertedRange {
            start: start_text.trim().to_string(),
            end: end_text.trim().to_string(),
        });
    }

    Ok(ParsedSchedule {
        days,
        time: Some(TimeRange { start, end }),
    })
}

/// Converts `h:mm AM|PM` into minutes since midnight.
fn parse_time(component: &str) -> Result<u16, ScheduleParseError> {
    let component = component.trim();
    let invalid = || ScheduleParseError::InvalidTime {
        component: component.to_string(),
    };

    let caps = TIME_REGEX.captures(component).ok_or_else(invalid)?;
    let hour: u16 = caps[1].parse().map_err(|_| invalid())?;
    let minute: u16 = caps[2].parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return Err(invalid());
    }

    let is_pm = caps[3].eq_ignore_ascii_case("PM");
    let hour = match (hour, is_pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };

    Ok(hour * 60 + minute)
}

fn format_minutes(minutes: u16) -> String {
    let (hour, minute) = (minutes / 60, minutes % 60);
    let modifier = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display_hour}:{minute:02} {modifier}")
}
