//! Day/time overlap detection between parsed schedules.

use super::ParsedSchedule;

/// Returns true if the two schedules meet on a shared day at overlapping
/// times.
///
/// Intervals are half-open, so a class ending at 1:15 PM and another starting
/// at 1:15 PM on the same day do not conflict.
pub fn conflicts(a: &ParsedSchedule, b: &ParsedSchedule) -> bool {
    // Disjoint days never conflict, whatever the times are.
    if a.days.is_disjoint(&b.days) {
        return false;
    }

    match (&a.time, &b.time) {
        (Some(ta), Some(tb)) => ta.overlaps(tb),
        _ => false,
    }
}

/// Finds the first conflicting pair `(i, j)` with `i < j`.
///
/// Pairs are visited in ascending order of `i`, then `j`, so the reported pair
/// is stable for a given input order.
pub fn find_conflict(schedules: &[ParsedSchedule]) -> Option<(usize, usize)> {
    for (i, a) in schedules.iter().enumerate() {
        for (j, b) in schedules.iter().enumerate().skip(i + 1) {
            if conflicts(a, b) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Returns true if any two schedules in the set conflict.
pub fn has_conflict(schedules: &[ParsedSchedule]) -> bool {
    find_conflict(schedules).is_some()
}
