//! # Domain Types
//!
//! Core domain types used throughout SkyCal.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Reservation   │   │ ReservationKey  │   │    Watermark    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id + start     │──►│  id             │   │  subresource_id │       │
//! │  │  end, site      │   │  start          │   │  last_seen_...  │       │
//! │  │  owner_id       │   └─────────────────┘   └─────────────────┘       │
//! │  │  origin         │                                                    │
//! │  └─────────────────┘   ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │     Origin      │   │ ReservationKind │       │
//! │                        │  Local | Remote │   │ Realtime|Project│       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Composite Key
//! A reservation is identified by `(id, start)`, not by `id` alone. The start
//! instant participates in the key so a site's reservations can be range
//! scanned without a separate sort key. Moving a reservation's start therefore
//! means deleting the old key and writing a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conflict;

// =============================================================================
// Origin
// =============================================================================

/// Provenance of a reservation.
///
/// The origin partitions the key space: direct requests only ever touch
/// `Local` records and the synchronization engine only ever touches `Remote`
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Created directly by a user-facing request.
    Local,
    /// Imported from the remote scheduler.
    Remote,
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Local
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Remote => write!(f, "remote"),
        }
    }
}

// =============================================================================
// Reservation Kind
// =============================================================================

/// What the reservation is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    /// A user operates the telescope interactively.
    Realtime,
    /// The telescope runs a project automatically.
    Project,
}

impl Default for ReservationKind {
    fn default() -> Self {
        ReservationKind::Realtime
    }
}

// =============================================================================
// Priority
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Standard,
    TimeCritical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Standard
    }
}

// =============================================================================
// Reservation Key
// =============================================================================

/// Composite primary key of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationKey {
    pub id: String,
    pub start: DateTime<Utc>,
}

impl ReservationKey {
    pub fn new(id: impl Into<String>, start: DateTime<Utc>) -> Self {
        ReservationKey {
            id: id.into(),
            start,
        }
    }
}

impl std::fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.start.to_rfc3339())
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// A reservation of a site for a time interval.
///
/// ## Invariants
/// - `start < end`
/// - `(id, start)` is unique
/// - `external_id` is present iff `origin == Remote`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Opaque identifier. Unique together with `start`.
    pub id: String,

    /// Inclusive start instant (UTC).
    pub start: DateTime<Utc>,

    /// Exclusive end instant (UTC).
    pub end: DateTime<Utc>,

    /// Reserved site, e.g. `"saf"` or `"mrc1"`.
    pub site: String,

    /// Principal that owns the reservation.
    pub owner_id: String,

    /// Display name of the owner.
    pub owner_name: String,

    /// Where the reservation came from.
    pub origin: Origin,

    /// Project this reservation runs, `None` when ungrouped.
    pub project_id: Option<String>,

    pub kind: ReservationKind,

    pub priority: Priority,

    pub title: String,

    /// Free-form note, may be empty.
    pub note: String,

    /// Identifier of the observation in the remote scheduler.
    pub external_id: Option<String>,

    /// When the record was last written.
    pub last_modified: DateTime<Utc>,
}

impl Reservation {
    /// Returns the composite key.
    pub fn key(&self) -> ReservationKey {
        ReservationKey::new(self.id.clone(), self.start)
    }

    /// Checks if the reservation was imported by the sync engine.
    #[inline]
    pub fn is_remote(&self) -> bool {
        self.origin == Origin::Remote
    }

    /// Checks if the half-open interval `[start, end)` intersects this one.
    #[inline]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        conflict::intervals_overlap(self.start, self.end, start, end)
    }

    /// Checks if the reservation is active at an instant (both ends inclusive).
    #[inline]
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    /// Returns the duration of the reservation.
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

// =============================================================================
// Reservation Changes
// =============================================================================

/// Field updates for a direct modification request.
///
/// `id`, `owner_id` and `origin` are deliberately absent: a modification can
/// never change who owns a reservation or where it came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationChanges {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub site: Option<String>,
    pub title: Option<String>,
    pub note: Option<String>,
    pub kind: Option<ReservationKind>,
    pub priority: Option<Priority>,
    /// `Some(None)` detaches the project.
    pub project_id: Option<Option<String>>,
}

impl ReservationChanges {
    /// Applies the changes to a copy of `original`.
    pub fn apply_to(&self, original: &Reservation, now: DateTime<Utc>) -> Reservation {
        let mut updated = original.clone();
        if let Some(start) = self.start {
            updated.start = start;
        }
        if let Some(end) = self.end {
            updated.end = end;
        }
        if let Some(ref site) = self.site {
            updated.site = site.clone();
        }
        if let Some(ref title) = self.title {
            updated.title = title.clone();
        }
        if let Some(ref note) = self.note {
            updated.note = note.clone();
        }
        if let Some(kind) = self.kind {
            updated.kind = kind;
        }
        if let Some(priority) = self.priority {
            updated.priority = priority;
        }
        if let Some(ref project_id) = self.project_id {
            updated.project_id = project_id.clone();
        }
        updated.last_modified = now;
        updated
    }
}

// =============================================================================
// Watermark
// =============================================================================

/// Last remote schedule version applied for one sub-resource.
///
/// Monotonically non-decreasing; written only after a complete apply step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub subresource_id: String,
    pub last_seen_remote_update: DateTime<Utc>,
    /// Wall-clock time of the commit.
    pub updated_at: DateTime<Utc>,
    /// Observations skipped by the pass that committed this watermark.
    pub skipped_last_pass: u32,
}

// =============================================================================
// Requester
// =============================================================================

/// Already-authenticated principal issuing a direct request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub is_admin: bool,
}

impl Requester {
    pub fn user(user_id: impl Into<String>) -> Self {
        Requester {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Requester {
            user_id: user_id.into(),
            is_admin: true,
        }
    }

    /// Owners and admins may mutate a reservation.
    pub fn can_mutate(&self, reservation: &Reservation) -> bool {
        self.is_admin || reservation.owner_id == self.user_id
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
