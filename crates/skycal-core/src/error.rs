//! # Error Types
//!
//! Domain-specific error types for skycal-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  skycal-core errors (this file)                                        │
//! │  ├── CoreError        - Direct-request failures (authz, conflict, ...) │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── TranslateError   - One remote observation cannot be mapped        │
//! │                                                                         │
//! │  skycal-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  skycal-sync errors (separate crate)                                   │
//! │  └── SyncError        - Remote fetch / pass failures                   │
//! │                                                                         │
//! │  Direct request:  ValidationError → CoreError → caller (no retry)      │
//! │  Sync pass:       TranslateError  → skipped item in the pass report    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors surfaced to the caller of a direct (user-facing) operation.
///
/// None of these are retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested reservation does not exist.
    #[error("Reservation not found: {0}")]
    NotFound(String),

    /// The caller may not mutate this reservation.
    ///
    /// ## When This Occurs
    /// - Modifying or deleting someone else's reservation without admin role
    #[error("Not authorized: {reason}")]
    Unauthorized { reason: String },

    /// The reservation was imported from the remote scheduler and is owned by
    /// the synchronization engine.
    #[error("Reservation {0} is managed by the remote scheduler")]
    RemoteManaged(String),

    /// The candidate overlaps another owner's reservation at the same site.
    ///
    /// ## User Workflow
    /// ```text
    /// Create 16:15-16:45 at "saf" (owner u2)
    ///      │
    ///      ▼
    /// Existing 16:00-16:30 at "saf" (owner u1)
    ///      │
    ///      ▼
    /// Conflict { site: "saf", existing: "<id of u1's reservation>" }
    /// ```
    #[error("Reservation conflicts with {existing} at site {site}")]
    Conflict { site: String, existing: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an Unauthorized error.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        CoreError::Unauthorized {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Interval is empty or inverted.
    #[error("start ({start}) must be before end ({end})")]
    InvalidInterval { start: String, end: String },

    /// Invalid format (e.g., bad timestamp).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Field combination is inconsistent.
    #[error("{field} is inconsistent: {reason}")]
    Inconsistent { field: String, reason: String },
}

// =============================================================================
// Translate Error
// =============================================================================

/// Failure to translate a single remote observation.
///
/// These never abort a sync pass; the observation is skipped and listed in
/// the pass report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// No local site is configured for this (remote site, telescope) pair.
    #[error("No local site mapped for remote site '{remote_site}' telescope '{telescope}'")]
    UnmappedSubresource {
        remote_site: String,
        telescope: String,
    },

    /// The observation maps to a different sub-resource than the one being
    /// synchronized.
    #[error("Observation belongs to {actual}, not {expected}")]
    ForeignSubresource { expected: String, actual: String },

    /// A timestamp field could not be parsed.
    #[error("Invalid {field} timestamp: '{value}'")]
    InvalidTimestamp { field: String, value: String },

    /// Observation start is not before its end.
    #[error("Observation interval is empty: {start} .. {end}")]
    InvalidInterval { start: String, end: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
