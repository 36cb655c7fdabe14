//! # Repository Module
//!
//! Database repository implementations for SkyCal.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  CalendarService / SyncEngine                                          │
//! │       │                                                                 │
//! │       │  db.reservations().find_overlapping("saf", start, end)         │
//! │       ▼                                                                 │
//! │  ReservationRepository                                                 │
//! │  ├── find_overlapping / find_by_site_and_range / find_at_time_*       │
//! │  ├── get(id, start)                                                    │
//! │  ├── upsert / batch_upsert                                             │
//! │  └── delete / batch_delete                                             │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Time Columns
//! Every instant is stored as `INTEGER` epoch milliseconds (UTC), suffixed
//! `_ms`. The helpers below are the only place that converts.
//!
//! ## Available Repositories
//!
//! - [`reservation::ReservationRepository`] - Reservation queries and batch writes
//! - [`watermark::WatermarkRepository`] - Per-sub-resource schedule watermarks

pub mod reservation;
pub mod watermark;

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};

/// Converts an instant to its stored form.
#[inline]
pub(crate) fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Converts a stored instant back, rejecting out-of-range values.
pub(crate) fn from_ms(column: &str, ms: i64) -> DbResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::CorruptRow(format!("{} out of range: {}", column, ms)))
}
