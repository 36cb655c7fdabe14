//! # Synchronization Engine
//!
//! Reconciles each sub-resource's imported reservations with the remote
//! scheduler.
//!
//! ## Pass State Machine (one sub-resource)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ACQUIRE   in-flight marker taken? ──yes──► Skipped(InFlight)          │
//! │     │                                                                   │
//! │  CHECK     watermark W (absent ⇒ always sync)                          │
//! │     │                                                                   │
//! │  FETCH     last_updated → V          ──err/timeout──► Failed           │
//! │     │                                                (W untouched)     │
//! │  COMPARE   V <= W ────────────────────────────────► UpToDate           │
//! │     │                                                (zero writes)     │
//! │  FETCH     observations in [now, now + horizon)  ──err──► Failed       │
//! │     │                                                                   │
//! │  TRANSLATE PENDING only; per-item failures are skipped + reported      │
//! │     │                                                                   │
//! │  APPLY     batch_upsert(new set)                                       │
//! │            batch_delete(remote ∧ site ∧ start >= now ∧ key ∉ new set)  │
//! │            registry: register new projects, retire pruned ones         │
//! │     │                                                                   │
//! │  COMMIT    watermark := V (only if still newer) ──────► Applied        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sub-resources run independently: [`SyncEngine::run_sync_all`] spawns one
//! task per configured sub-resource and one failure never affects another.
//! Only `origin = remote` records are ever deleted, so locally created
//! reservations are outside the engine's reach.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{FetchWindow, HttpScheduleFetcher, ObservationBatch, ScheduleFetcher};
use crate::guard::InFlight;
use crate::registry::{HttpProjectRegistry, NoOpRegistry, ProjectRegistry};
use crate::report::{ItemFailure, LoggingObserver, PassOutcome, PassReport, SkipReason, SyncObserver};
use skycal_core::{
    to_store_precision, Reservation, ReservationKey, ScheduleTranslator, TranslatedObservation,
    Watermark,
};
use skycal_db::{Database, ReservationRepository, WatermarkRepository};

// =============================================================================
// Settings
// =============================================================================

/// Timing parameters of a pass.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Bound on all remote calls of one pass.
    pub fetch_timeout: Duration,
    /// Length of the reconciled window after "now".
    pub horizon: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            fetch_timeout: Duration::from_secs(30),
            horizon: chrono::Duration::days(21),
        }
    }
}

/// Translated observations for a window, nothing written.
#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub observations: Vec<TranslatedObservation>,
    pub skipped: Vec<ItemFailure>,
}

// =============================================================================
// Engine
// =============================================================================

/// Runs sync passes. Cheap to clone; clones share the in-flight markers.
#[derive(Clone)]
pub struct SyncEngine {
    reservations: ReservationRepository,
    watermarks: WatermarkRepository,
    translator: ScheduleTranslator,
    fetcher: Arc<dyn ScheduleFetcher>,
    registry: Arc<dyn ProjectRegistry>,
    observer: Arc<dyn SyncObserver>,
    in_flight: InFlight,
    settings: EngineSettings,
}

impl SyncEngine {
    /// Creates an engine with no project registry and the logging observer.
    pub fn new(
        db: &Database,
        translator: ScheduleTranslator,
        fetcher: Arc<dyn ScheduleFetcher>,
    ) -> Self {
        SyncEngine {
            reservations: db.reservations(),
            watermarks: db.watermarks(),
            translator,
            fetcher,
            registry: Arc::new(NoOpRegistry),
            observer: Arc::new(LoggingObserver),
            in_flight: InFlight::new(),
            settings: EngineSettings::default(),
        }
    }

    /// Wires the HTTP fetcher and, when configured, the HTTP project registry.
    pub fn from_config(config: &SyncConfig, db: &Database) -> SyncResult<Self> {
        let translator =
            ScheduleTranslator::new(config.site_map()).with_label(config.remote.label.clone());
        let fetcher = HttpScheduleFetcher::from_config(config)?;

        let mut engine = Self::new(db, translator, Arc::new(fetcher)).with_settings(EngineSettings {
            fetch_timeout: config.fetch_timeout(),
            horizon: config.horizon(),
        });

        if let Some(ref url) = config.projects.url {
            let registry = HttpProjectRegistry::new(reqwest::Client::new(), url.parse()?);
            engine = engine.with_registry(Arc::new(registry));
        }

        info!(
            subresources = engine.subresource_ids().len(),
            registry = config.projects.url.is_some(),
            "Sync engine configured"
        );
        Ok(engine)
    }

    pub fn with_registry(mut self, registry: Arc<dyn ProjectRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Every sub-resource known to the site map, sorted.
    pub fn subresource_ids(&self) -> Vec<String> {
        self.translator.sites().sites().map(str::to_string).collect()
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Runs one pass for `subresource_id`, reconciling from `now` onwards.
    ///
    /// ## Returns
    /// - `Ok(report)` for `Applied`, `UpToDate` and `Skipped` passes
    /// - `Err(_)` when the pass was aborted; the watermark is untouched and
    ///   the observer has seen a `Failed` report
    pub async fn run_sync_pass(
        &self,
        subresource_id: &str,
        now: DateTime<Utc>,
    ) -> SyncResult<PassReport> {
        if self.translator.sites().reverse(subresource_id).is_none() {
            return Err(SyncError::UnknownSubresource(subresource_id.to_string()));
        }

        let Some(_guard) = self.in_flight.try_acquire(subresource_id) else {
            let report = PassReport::new(subresource_id, PassOutcome::Skipped(SkipReason::InFlight));
            self.observer.on_pass(&report).await;
            return Ok(report);
        };

        debug!(subresource = %subresource_id, now = %now, "Sync pass starting");

        match self.pass(subresource_id, now).await {
            Ok(report) => {
                self.observer.on_pass(&report).await;
                Ok(report)
            }
            Err(e) => {
                self.observer
                    .on_pass(&PassReport::failed(subresource_id, &e))
                    .await;
                Err(e)
            }
        }
    }

    /// Runs a pass for every sub-resource concurrently.
    ///
    /// Aborted passes appear as `Failed` reports. Reports are sorted by
    /// sub-resource id.
    pub async fn run_sync_all(&self, now: DateTime<Utc>) -> Vec<PassReport> {
        let mut tasks = JoinSet::new();
        for id in self.subresource_ids() {
            let engine = self.clone();
            tasks.spawn(async move {
                let result = engine.run_sync_pass(&id, now).await;
                (id, result)
            });
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => reports.push(report),
                Ok((id, Err(e))) => reports.push(PassReport::failed(id, &e)),
                Err(e) => error!(error = %e, "Sync pass task panicked"),
            }
        }

        reports.sort_by(|a, b| a.subresource_id.cmp(&b.subresource_id));
        reports
    }

    /// Fetches and translates observations in `[start, end)` in every state,
    /// without touching the store or the watermark.
    pub async fn preview_window(
        &self,
        subresource_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<Preview> {
        if self.translator.sites().reverse(subresource_id).is_none() {
            return Err(SyncError::UnknownSubresource(subresource_id.to_string()));
        }
        if start >= end {
            return Ok(Preview::default());
        }

        let deadline = Instant::now() + self.settings.fetch_timeout;
        let window = FetchWindow::new(start, end);
        let batch = self
            .bounded(
                subresource_id,
                deadline,
                self.fetcher.fetch_observations(subresource_id, &window),
            )
            .await?;

        let mut preview = Preview::default();
        for obs in &batch.observations {
            match self.translator.translate(subresource_id, obs) {
                Ok(t) => preview.observations.push(t),
                Err(e) => preview
                    .skipped
                    .push(ItemFailure::new(format!("observation {}", obs.id), e)),
            }
        }
        Ok(preview)
    }

    // =========================================================================
    // Pass Steps
    // =========================================================================

    async fn pass(&self, subresource_id: &str, now: DateTime<Utc>) -> SyncResult<PassReport> {
        let last_seen = self
            .watermarks
            .get(subresource_id)
            .await?
            .map(|w| w.last_seen_remote_update);

        let deadline = Instant::now() + self.settings.fetch_timeout;
        // compared against a watermark read back at store precision
        let remote_updated_at = to_store_precision(
            self.bounded(subresource_id, deadline, self.fetcher.last_updated(subresource_id))
                .await?,
        );

        let mut report = PassReport::new(subresource_id, PassOutcome::UpToDate);
        report.remote_updated_at = Some(remote_updated_at);

        if let Some(seen) = last_seen {
            if remote_updated_at <= seen {
                debug!(
                    subresource = %subresource_id,
                    remote = %remote_updated_at,
                    watermark = %seen,
                    "Remote schedule not newer than watermark"
                );
                return Ok(report);
            }
        }

        let window = FetchWindow::ahead(now, self.settings.horizon);
        let batch = self
            .bounded(
                subresource_id,
                deadline,
                self.fetcher.fetch_observations(subresource_id, &window),
            )
            .await?;

        let translated = self.translate_batch(subresource_id, batch, &mut report);
        self.apply(subresource_id, now, &translated, &mut report)
            .await?;
        self.commit(subresource_id, remote_updated_at, now, &mut report)
            .await?;

        report.outcome = PassOutcome::Applied;
        Ok(report)
    }

    /// Applies the fetch deadline to one remote call.
    async fn bounded<T>(
        &self,
        subresource_id: &str,
        deadline: Instant,
        call: impl std::future::Future<Output = SyncResult<T>>,
    ) -> SyncResult<T> {
        tokio::time::timeout_at(deadline, call)
            .await
            .map_err(|_| {
                SyncError::unavailable(
                    subresource_id,
                    format!("fetch timed out after {:?}", self.settings.fetch_timeout),
                )
            })?
    }

    fn translate_batch(
        &self,
        subresource_id: &str,
        batch: ObservationBatch,
        report: &mut PassReport,
    ) -> Vec<TranslatedObservation> {
        for undecodable in batch.undecodable {
            report
                .translation_skips
                .push(ItemFailure::new("payload", undecodable));
        }

        let mut translated = Vec::with_capacity(batch.observations.len());
        for obs in &batch.observations {
            if !obs.state.is_schedulable() {
                report.ignored += 1;
                continue;
            }
            match self.translator.translate(subresource_id, obs) {
                Ok(t) => translated.push(t),
                Err(e) => report
                    .translation_skips
                    .push(ItemFailure::new(format!("observation {}", obs.id), e)),
            }
        }
        translated
    }

    async fn apply(
        &self,
        subresource_id: &str,
        now: DateTime<Utc>,
        translated: &[TranslatedObservation],
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let incoming: Vec<Reservation> = translated.iter().map(|t| t.reservation.clone()).collect();
        let upserted = self.reservations.batch_upsert(&incoming).await;

        report.upserted = upserted.succeeded.len();
        for failure in &upserted.failed {
            report
                .store_failures
                .push(ItemFailure::new(failure.key.to_string(), &failure.error));
        }

        let stored: HashSet<&ReservationKey> = upserted.succeeded.iter().collect();
        for t in translated {
            if !stored.contains(&t.reservation.key()) {
                continue;
            }
            if let Err(e) = self.registry.register(&t.project).await {
                report
                    .registry_failures
                    .push(ItemFailure::new(t.project.project_id.clone(), e));
            }
        }

        // everything in the new set survives, even if its upsert failed
        let keep: HashSet<ReservationKey> = incoming.iter().map(Reservation::key).collect();
        let stale: Vec<Reservation> = self
            .reservations
            .find_remote_from(subresource_id, now)
            .await?
            .into_iter()
            .filter(|r| !keep.contains(&r.key()))
            .collect();

        if stale.is_empty() {
            return Ok(());
        }

        let stale_keys: Vec<ReservationKey> = stale.iter().map(Reservation::key).collect();
        let deleted = self.reservations.batch_delete(&stale_keys).await;
        report.deleted = deleted.succeeded.len();
        for failure in &deleted.failed {
            report
                .store_failures
                .push(ItemFailure::new(failure.key.to_string(), &failure.error));
        }

        // a rescheduled observation keeps its project under the new key
        let live: HashSet<&str> = incoming.iter().filter_map(|r| r.project_id.as_deref()).collect();
        let removed: HashSet<&ReservationKey> = deleted.succeeded.iter().collect();
        let mut retired: Vec<String> = stale
            .iter()
            .filter(|r| removed.contains(&r.key()))
            .filter_map(|r| r.project_id.clone())
            .filter(|project_id| !live.contains(project_id.as_str()))
            .collect();
        retired.sort();
        retired.dedup();
        if !retired.is_empty() {
            if let Err(e) = self.registry.retire(&retired).await {
                report
                    .registry_failures
                    .push(ItemFailure::new(retired.join(","), e));
            }
        }

        Ok(())
    }

    async fn commit(
        &self,
        subresource_id: &str,
        remote_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        // re-read: another process may have committed a newer version
        if let Some(current) = self.watermarks.get(subresource_id).await? {
            if current.last_seen_remote_update >= remote_updated_at {
                debug!(
                    subresource = %subresource_id,
                    watermark = %current.last_seen_remote_update,
                    "Watermark already at or past fetched version"
                );
                return Ok(());
            }
        }

        let watermark = Watermark {
            subresource_id: subresource_id.to_string(),
            last_seen_remote_update: remote_updated_at,
            updated_at: now,
            skipped_last_pass: u32::try_from(report.skipped()).unwrap_or(u32::MAX),
        };
        self.watermarks.set(&watermark).await?;
        report.committed_watermark = Some(remote_updated_at);
        Ok(())
    }
}
