//! # Pass Reports
//!
//! Summary of one sub-resource's sync pass, and the observer that receives
//! it.
//!
//! ## Outcomes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Applied   fetched version was newer; translate + apply ran and the    │
//! │            watermark was committed (item failures listed separately)   │
//! │  UpToDate  fetched version <= watermark; zero writes                   │
//! │  Skipped   pass not attempted (another pass holds the sub-resource)    │
//! │  Failed    pass aborted before apply; watermark untouched              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Why a pass was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A previous pass for the same sub-resource is still running.
    InFlight,
}

/// Terminal state of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Applied,
    UpToDate,
    Skipped(SkipReason),
    Failed { reason: String, retryable: bool },
}

impl std::fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassOutcome::Applied => write!(f, "applied"),
            PassOutcome::UpToDate => write!(f, "up_to_date"),
            PassOutcome::Skipped(SkipReason::InFlight) => write!(f, "skipped_in_flight"),
            PassOutcome::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// One observation or record that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, reason: impl ToString) -> Self {
        ItemFailure {
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result of one sub-resource pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub subresource_id: String,
    pub outcome: PassOutcome,
    /// Version reported by the remote, when the remote was reached.
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub upserted: usize,
    pub deleted: usize,
    /// Observations not in a schedulable state.
    pub ignored: usize,
    /// Observations that could not be decoded or translated.
    pub translation_skips: Vec<ItemFailure>,
    /// Upserts and deletes that failed.
    pub store_failures: Vec<ItemFailure>,
    pub registry_failures: Vec<ItemFailure>,
    /// Watermark written by this pass.
    pub committed_watermark: Option<DateTime<Utc>>,
}

impl PassReport {
    pub fn new(subresource_id: impl Into<String>, outcome: PassOutcome) -> Self {
        PassReport {
            subresource_id: subresource_id.into(),
            outcome,
            remote_updated_at: None,
            upserted: 0,
            deleted: 0,
            ignored: 0,
            translation_skips: Vec::new(),
            store_failures: Vec::new(),
            registry_failures: Vec::new(),
            committed_watermark: None,
        }
    }

    pub fn failed(subresource_id: impl Into<String>, error: &crate::SyncError) -> Self {
        Self::new(
            subresource_id,
            PassOutcome::Failed {
                reason: error.to_string(),
                retryable: error.is_retryable(),
            },
        )
    }

    /// Observations dropped before reaching the store.
    pub fn skipped(&self) -> usize {
        self.translation_skips.len()
    }

    /// True if the pass ran to completion with nothing left behind.
    pub fn is_clean(&self) -> bool {
        matches!(self.outcome, PassOutcome::Applied | PassOutcome::UpToDate)
            && self.translation_skips.is_empty()
            && self.store_failures.is_empty()
            && self.registry_failures.is_empty()
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Receives every pass report.
#[async_trait]
pub trait SyncObserver: Send + Sync {
    async fn on_pass(&self, report: &PassReport);
}

/// Default observer: writes each report to the log.
///
/// A pass that skipped observations is logged at `warn` with the counter,
/// every time, so a persistently bad observation stays visible after the
/// watermark has moved past it.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver;

#[async_trait]
impl SyncObserver for LoggingObserver {
    async fn on_pass(&self, report: &PassReport) {
        match report.outcome {
            PassOutcome::Applied => {
                if report.skipped() > 0 || !report.store_failures.is_empty() {
                    warn!(
                        subresource = %report.subresource_id,
                        upserted = report.upserted,
                        deleted = report.deleted,
                        skipped = report.skipped(),
                        store_failures = report.store_failures.len(),
                        registry_failures = report.registry_failures.len(),
                        watermark = ?report.committed_watermark,
                        "Schedule applied with skipped observations"
                    );
                    for skip in &report.translation_skips {
                        warn!(subresource = %report.subresource_id, item = %skip.item, reason = %skip.reason, "Skipped observation");
                    }
                } else {
                    info!(
                        subresource = %report.subresource_id,
                        upserted = report.upserted,
                        deleted = report.deleted,
                        ignored = report.ignored,
                        registry_failures = report.registry_failures.len(),
                        watermark = ?report.committed_watermark,
                        "Schedule applied"
                    );
                }
            }
            PassOutcome::UpToDate => {
                debug!(subresource = %report.subresource_id, "Schedule unchanged");
            }
            PassOutcome::Skipped(reason) => {
                info!(subresource = %report.subresource_id, ?reason, "Pass skipped");
            }
            PassOutcome::Failed {
                ref reason,
                retryable,
            } => {
                warn!(
                    subresource = %report.subresource_id,
                    retryable,
                    error = %reason,
                    "Sync pass failed"
                );
            }
        }
    }
}
