//! # Conflict Detector
//!
//! Runs the pure conflict rules from `skycal_core::conflict` against the
//! reservations stored at a site.
//!
//! ## Check Flow
//! ```text
//! candidate (site, start, end, owner)
//!      │
//!      ▼
//! find_overlapping(site, start, end)   ← narrowed by the (site, end_ms) index
//!      │
//!      ▼
//! first r where is_conflict(candidate, r, exclude_self)
//!      │
//!      ├── found  → conflict
//!      └── none   → free
//! ```
//!
//! An empty candidate (`start == end`) short-circuits to "free" without a
//! query.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::reservation::ReservationRepository;
use skycal_core::conflict;
use skycal_core::Reservation;

/// Store-backed conflict checks.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    reservations: ReservationRepository,
}

impl ConflictDetector {
    pub fn new(reservations: ReservationRepository) -> Self {
        ConflictDetector { reservations }
    }

    /// Returns the first stored reservation that blocks `candidate`.
    ///
    /// ## Arguments
    /// * `exclude_self` - set when `candidate` is a modification of a stored
    ///   reservation with the same id
    pub async fn find_conflict(
        &self,
        candidate: &Reservation,
        exclude_self: bool,
    ) -> DbResult<Option<Reservation>> {
        if candidate.start >= candidate.end {
            return Ok(None);
        }

        let overlapping = self
            .reservations
            .find_overlapping(&candidate.site, candidate.start, candidate.end)
            .await?;

        let hit = conflict::first_conflict(candidate, &overlapping, exclude_self).cloned();

        debug!(
            site = %candidate.site,
            candidate = %candidate.id,
            overlapping = overlapping.len(),
            conflict = hit.is_some(),
            "Conflict check"
        );

        Ok(hit)
    }

    /// Checks whether `candidate` collides with another owner's reservation.
    pub async fn has_conflict(&self, candidate: &Reservation, exclude_self: bool) -> DbResult<bool> {
        Ok(self.find_conflict(candidate, exclude_self).await?.is_some())
    }

    /// Checks whether `user_id` holds a reservation at `site` active at `at`.
    pub async fn is_user_scheduled(
        &self,
        user_id: &str,
        site: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let active = self.reservations.find_at_time_site(site, at).await?;
        Ok(conflict::is_owner_active_at(user_id, at, &active))
    }

    /// Checks whether anyone other than `user_id` holds `site` at `at`.
    ///
    /// With no reservation at all, the site is free for everyone.
    pub async fn does_conflicting_event_exist(
        &self,
        user_id: &str,
        site: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let active = self.reservations.find_at_time_site(site, at).await?;
        Ok(conflict::is_other_owner_active_at(user_id, at, &active))
    }
}
