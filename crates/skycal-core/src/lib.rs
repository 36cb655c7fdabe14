//! # skycal-core: Pure Domain Logic for SkyCal
//!
//! This crate is the **heart** of SkyCal. It holds the reservation model,
//! the interval-conflict rules and the remote schedule translator as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SkyCal Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request layer (routing, auth, bodies)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plain function calls                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        skycal-db (store, conflict detector, service)           │   │
//! │  │        skycal-sync (fetcher, sync engine)                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ skycal-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ conflict  │  │ translate │  │ validation│  │   │
//! │  │   │Reservation│  │ overlap   │  │  SiteMap  │  │   rules   │  │   │
//! │  │   │ Watermark │  │ predicate │  │ Translator│  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Reservation, keys, watermark, requester
//! - [`conflict`] - Half-open interval overlap and ownership-aware conflicts
//! - [`remote`] - The remote scheduler's native observation schema
//! - [`translate`] - Remote observation → local reservation + project
//! - [`validation`] - Input validation for direct requests
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use skycal_core::conflict::intervals_overlap;
//!
//! let at = |h, m| Utc.with_ymd_and_hms(2024, 5, 14, h, m, 0).unwrap();
//!
//! // 16:00-16:30 and 16:15-16:45 overlap
//! assert!(intervals_overlap(at(16, 0), at(16, 30), at(16, 15), at(16, 45)));
//!
//! // Back-to-back reservations share a boundary but never overlap
//! assert!(!intervals_overlap(at(16, 0), at(16, 30), at(16, 30), at(17, 0)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod conflict;
pub mod error;
pub mod remote;
pub mod translate;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, TranslateError, ValidationError};
pub use remote::{ObservationState, RemoteObservation, RemoteProject};
pub use translate::{to_store_precision, ScheduleTranslator, SiteMap, TranslatedObservation};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Stored project reference for reservations that belong to no project.
///
/// The store keeps a non-null sentinel so the column can be indexed; in Rust
/// the same state is `Option::None`.
pub const NO_PROJECT: &str = "none";

/// Label of the remote scheduler, used to namespace imported owners
/// (`"{submitter}#LCO"`) and titles.
pub const DEFAULT_REMOTE_LABEL: &str = "LCO";

/// Maximum length of a reservation title.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum length of a reservation note.
pub const MAX_NOTE_LEN: usize = 2000;
