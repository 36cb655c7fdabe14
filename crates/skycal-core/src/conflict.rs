//! # Conflict Rules
//!
//! Pure predicates deciding whether two reservations collide.
//!
//! ## Overlap Rule
//! ```text
//! Intervals are half-open: [start, end)
//!
//!   A ├────────────┤
//!   B        ├────────────┤        overlap: A.start < B.end && A.end > B.start
//!
//!   A ├──────┤
//!   C        ├──────┤              adjacent: A.end == C.start, no overlap
//!
//!   Z        ┼                     empty (start == end): overlaps nothing
//! ```
//!
//! ## Conflict Rule
//! An overlapping reservation is a conflict only when it sits at the same
//! site and belongs to a different owner. When modifying an existing
//! reservation (`exclude_self`), its own stored record never counts.

use chrono::{DateTime, Utc};

use crate::types::Reservation;

/// Checks whether two half-open intervals intersect.
///
/// An empty interval (`start >= end`) never intersects anything.
#[inline]
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    if a_start >= a_end || b_start >= b_end {
        return false;
    }
    a_start < b_end && a_end > b_start
}

/// Decides whether `existing` blocks `candidate`.
pub fn is_conflict(candidate: &Reservation, existing: &Reservation, exclude_self: bool) -> bool {
    if existing.site != candidate.site {
        return false;
    }
    if existing.owner_id == candidate.owner_id {
        return false;
    }
    if exclude_self && existing.id == candidate.id {
        return false;
    }
    intervals_overlap(existing.start, existing.end, candidate.start, candidate.end)
}

/// Returns the first reservation in `existing` that blocks `candidate`.
///
/// Order of `existing` is irrelevant to whether a conflict is found.
pub fn first_conflict<'a, I>(
    candidate: &Reservation,
    existing: I,
    exclude_self: bool,
) -> Option<&'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    existing
        .into_iter()
        .find(|r| is_conflict(candidate, r, exclude_self))
}

/// Checks whether `user_id` owns a reservation active at `at`.
pub fn is_owner_active_at<'a, I>(user_id: &str, at: DateTime<Utc>, reservations: I) -> bool
where
    I: IntoIterator<Item = &'a Reservation>,
{
    reservations
        .into_iter()
        .any(|r| r.owner_id == user_id && r.is_active_at(at))
}

/// Checks whether someone other than `user_id` holds a reservation active at `at`.
pub fn is_other_owner_active_at<'a, I>(user_id: &str, at: DateTime<Utc>, reservations: I) -> bool
where
    I: IntoIterator<Item = &'a Reservation>,
{
    reservations
        .into_iter()
        .any(|r| r.owner_id != user_id && r.is_active_at(at))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Origin, Priority, ReservationKind};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, h, m, 0).unwrap()
    }

    fn reservation(id: &str, owner: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Reservation {
        Reservation {
            id: id.to_string(),
            start,
            end,
            site: "saf".to_string(),
            owner_id: owner.to_string(),
            owner_name: owner.to_string(),
            origin: Origin::Local,
            project_id: None,
            kind: ReservationKind::Realtime,
            priority: Priority::Standard,
            title: String::new(),
            note: String::new(),
            external_id: None,
            last_modified: at(0, 0),
        }
    }

    #[test]
    fn test_overlap_basic() {
        assert!(intervals_overlap(at(16, 0), at(16, 30), at(16, 15), at(16, 45)));
        assert!(intervals_overlap(at(16, 15), at(16, 45), at(16, 0), at(16, 30)));
        // containment
        assert!(intervals_overlap(at(16, 0), at(17, 0), at(16, 10), at(16, 20)));
        assert!(!intervals_overlap(at(16, 0), at(16, 30), at(17, 0), at(17, 30)));
    }

    #[test]
    fn test_adjacent_never_overlap() {
        assert!(!intervals_overlap(at(16, 0), at(16, 30), at(16, 30), at(17, 0)));
        assert!(!intervals_overlap(at(16, 30), at(17, 0), at(16, 0), at(16, 30)));
    }

    #[test]
    fn test_zero_duration_never_overlaps() {
        assert!(!intervals_overlap(at(16, 0), at(16, 30), at(16, 15), at(16, 15)));
        assert!(!intervals_overlap(at(16, 15), at(16, 15), at(16, 0), at(16, 30)));
    }

    #[test]
    fn test_saf_scenario() {
        let a = reservation("a", "u1", at(16, 0), at(16, 30));
        let b = reservation("b", "u2", at(16, 15), at(16, 45));
        let c = reservation("c", "u1", at(16, 15), at(16, 45));

        assert!(is_conflict(&b, &a, false));
        assert!(!is_conflict(&c, &a, false));
    }

    #[test]
    fn test_different_site_is_not_conflict() {
        let a = reservation("a", "u1", at(16, 0), at(16, 30));
        let mut b = reservation("b", "u2", at(16, 0), at(16, 30));
        b.site = "mrc1".to_string();
        assert!(!is_conflict(&b, &a, false));
    }

    #[test]
    fn test_exclude_self() {
        // same id, different owner: only the id check keeps it out
        let stored = reservation("a", "u1", at(16, 0), at(16, 30));
        let edited = reservation("a", "u9", at(16, 10), at(16, 40));

        assert!(is_conflict(&edited, &stored, false));
        assert!(!is_conflict(&edited, &stored, true));
    }

    #[test]
    fn test_first_conflict_picks_other_owner() {
        let existing = vec![
            reservation("mine", "u2", at(16, 0), at(16, 30)),
            reservation("theirs", "u1", at(16, 20), at(16, 50)),
        ];
        let candidate = reservation("new", "u2", at(16, 15), at(16, 45));

        let hit = first_conflict(&candidate, &existing, false).map(|r| r.id.as_str());
        assert_eq!(hit, Some("theirs"));
    }

    #[test]
    fn test_point_queries() {
        let existing = vec![reservation("a", "u1", at(16, 0), at(16, 30))];

        assert!(is_owner_active_at("u1", at(16, 30), &existing));
        assert!(!is_owner_active_at("u2", at(16, 10), &existing));
        assert!(is_other_owner_active_at("u2", at(16, 10), &existing));
        assert!(!is_other_owner_active_at("u1", at(16, 10), &existing));
    }
}
