//! # skycal-db: Database Layer for SkyCal
//!
//! This crate provides reservation storage for SkyCal.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SkyCal Data Flow                                 │
//! │                                                                         │
//! │  Direct request (create / modify / delete)     Sync engine (skycal-sync)│
//! │       │                                               │                 │
//! │       ▼                                               ▼                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     skycal-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │CalendarService│───►│ConflictDetect.│───►│ Reservation  │  │   │
//! │  │   │ (service.rs)  │    │ (conflict.rs) │    │  Repository  │  │   │
//! │  │   └───────────────┘    └───────────────┘    ├──────────────┤  │   │
//! │  │                                             │  Watermark   │  │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    │  Repository  │  │   │
//! │  │   │   Database    │    │  Migrations   │    └──────────────┘  │   │
//! │  │   │   (pool.rs)   │    │  (embedded)   │                      │   │
//! │  │   └───────────────┘    └───────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/skycal/skycal.db                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and service error types
//! - [`repository`] - Reservation and watermark repositories
//! - [`conflict`] - Store-backed conflict detector
//! - [`service`] - Direct-request calendar operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skycal_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/skycal.db")).await?;
//!
//! let overlapping = db
//!     .reservations()
//!     .find_overlapping("saf", start, end)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod conflict;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use conflict::ConflictDetector;
pub use error::{CalendarError, CalendarResult, DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::{CalendarService, NewReservation};

// Repository re-exports for convenience
pub use repository::reservation::{BatchFailure, BatchReport, ReservationRepository};
pub use repository::watermark::WatermarkRepository;
