//! # skycal-sync: Remote Schedule Synchronization for SkyCal
//!
//! Keeps the reservations imported from the remote scheduler in line with
//! the schedule the scheduler currently publishes, one sub-resource (local
//! site) at a time.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncEngine (per-pass orchestrator)               │  │
//! │  │                                                                  │  │
//! │  │  run_sync_all(now) ─► one task per sub-resource (JoinSet)       │  │
//! │  │  run_sync_pass(id, now) ─► check → fetch → translate → apply    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ ScheduleFetcher│  │ InFlight guard │  │  ProjectRegistry       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ site proxy     │  │ one pass per   │  │ new-project /          │    │
//! │  │ HTTP + backoff │  │ sub-resource   │  │ delete-scheduler-proj. │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Store: skycal-db reservation + watermark repositories                 │
//! │  Reports: PassReport per sub-resource → SyncObserver                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML + environment configuration, site table
//! - [`engine`] - `SyncEngine` pass state machine
//! - [`error`] - Sync error types
//! - [`fetcher`] - Remote schedule fetcher trait and HTTP implementation
//! - [`guard`] - Per-sub-resource in-flight marker
//! - [`registry`] - Projects backend client
//! - [`report`] - Pass reports and observers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skycal_db::{Database, DbConfig};
//! use skycal_sync::{SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load(None)?;
//! let db = Database::new(DbConfig::new(&config.database.path)).await?;
//! let engine = SyncEngine::from_config(&config, &db)?;
//!
//! for report in engine.run_sync_all(chrono::Utc::now()).await {
//!     println!("{}: {}", report.subresource_id, report.outcome);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod guard;
pub mod registry;
pub mod report;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{SubresourceConfig, SyncConfig};
pub use engine::{EngineSettings, Preview, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use fetcher::{
    FetchWindow, HttpScheduleFetcher, ObservationBatch, RemoteSchedule, RetrySettings,
    ScheduleFetcher,
};
pub use guard::{InFlight, InFlightGuard};
pub use registry::{HttpProjectRegistry, NoOpRegistry, ProjectRegistry};
pub use report::{ItemFailure, LoggingObserver, PassOutcome, PassReport, SkipReason, SyncObserver};
