//! # Reservation Repository
//!
//! Typed reads and writes against the `reservations` table.
//!
//! ## Access Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Query                          Index used                               │
//! │  ─────────────────────────────  ─────────────────────────────────────   │
//! │  get(id, start)                 PRIMARY KEY (id, start_ms)              │
//! │  find_overlapping(site, a, b)   (site, end_ms)  end > a, start < b      │
//! │  find_by_site_and_range         (site, end_ms)  a <= end <= b           │
//! │  find_at_time_site(site, t)     (site, end_ms)  start <= t <= end       │
//! │  find_by_owner_ending_after     (owner_id, end_ms)                      │
//! │  find_at_time_owner(owner, t)   (owner_id, end_ms)                      │
//! │  find_remote_from(site, cutoff) (origin, site, start_ms)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Batch Writes
//! Batches are best-effort per item. A failed row never stops the rest of
//! the batch; it is listed in the returned [`BatchReport`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use super::{from_ms, to_ms};
use crate::error::{DbError, DbResult};
use skycal_core::{Origin, Priority, Reservation, ReservationKey, ReservationKind, NO_PROJECT};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, start_ms, end_ms, site, owner_id, owner_name, origin,
        project_id, kind, priority, title, note, external_id, last_modified_ms
    FROM reservations
"#;

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: String,
    start_ms: i64,
    end_ms: i64,
    site: String,
    owner_id: String,
    owner_name: String,
    origin: Origin,
    project_id: String,
    kind: ReservationKind,
    priority: Priority,
    title: String,
    note: String,
    external_id: Option<String>,
    last_modified_ms: i64,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = DbError;

    fn try_from(row: ReservationRow) -> DbResult<Self> {
        let project_id = if row.project_id == NO_PROJECT {
            None
        } else {
            Some(row.project_id)
        };

        Ok(Reservation {
            start: from_ms("start_ms", row.start_ms)?,
            end: from_ms("end_ms", row.end_ms)?,
            last_modified: from_ms("last_modified_ms", row.last_modified_ms)?,
            id: row.id,
            site: row.site,
            owner_id: row.owner_id,
            owner_name: row.owner_name,
            origin: row.origin,
            project_id,
            kind: row.kind,
            priority: row.priority,
            title: row.title,
            note: row.note,
            external_id: row.external_id,
        })
    }
}

fn into_reservations(rows: Vec<ReservationRow>) -> DbResult<Vec<Reservation>> {
    rows.into_iter().map(Reservation::try_from).collect()
}

// =============================================================================
// Batch Report
// =============================================================================

/// One item that failed inside a batch write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub key: ReservationKey,
    pub error: String,
}

/// Per-item outcome of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<ReservationKey>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, key: ReservationKey, result: DbResult<()>) {
        match result {
            Ok(()) => self.succeeded.push(key),
            Err(e) => {
                warn!(key = %key, error = %e, "Batch item failed");
                self.failed.push(BatchFailure {
                    key,
                    error: e.to_string(),
                });
            }
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for reservation operations.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: SqlitePool,
}

impl ReservationRepository {
    /// Creates a new ReservationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReservationRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Reservations at `site` whose interval intersects `[start, end)`.
    ///
    /// Half-open: a reservation ending exactly at `start` is not returned.
    pub async fn find_overlapping(
        &self,
        site: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<Reservation>> {
        debug!(site = %site, start = %start, end = %end, "Finding overlapping reservations");

        let sql = format!(
            "{} WHERE site = ?1 AND end_ms > ?2 AND start_ms < ?3 ORDER BY start_ms",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(site)
            .bind(to_ms(start))
            .bind(to_ms(end))
            .fetch_all(&self.pool)
            .await?;

        into_reservations(rows)
    }

    /// Reservations at `site` ending within `[range_start, range_end]`.
    pub async fn find_by_site_and_range(
        &self,
        site: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> DbResult<Vec<Reservation>> {
        let sql = format!(
            "{} WHERE site = ?1 AND end_ms BETWEEN ?2 AND ?3 ORDER BY start_ms",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(site)
            .bind(to_ms(range_start))
            .bind(to_ms(range_end))
            .fetch_all(&self.pool)
            .await?;

        into_reservations(rows)
    }

    /// Reservations owned by `owner_id` that end at or after `after`.
    pub async fn find_by_owner_ending_after(
        &self,
        owner_id: &str,
        after: DateTime<Utc>,
    ) -> DbResult<Vec<Reservation>> {
        let sql = format!(
            "{} WHERE owner_id = ?1 AND end_ms >= ?2 ORDER BY start_ms",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(owner_id)
            .bind(to_ms(after))
            .fetch_all(&self.pool)
            .await?;

        into_reservations(rows)
    }

    /// Reservations at `site` active at `at` (`start <= at <= end`).
    pub async fn find_at_time_site(
        &self,
        site: &str,
        at: DateTime<Utc>,
    ) -> DbResult<Vec<Reservation>> {
        let sql = format!(
            "{} WHERE site = ?1 AND end_ms >= ?2 AND start_ms <= ?2 ORDER BY start_ms",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(site)
            .bind(to_ms(at))
            .fetch_all(&self.pool)
            .await?;

        into_reservations(rows)
    }

    /// Reservations owned by `owner_id` active at `at` (`start <= at <= end`).
    pub async fn find_at_time_owner(
        &self,
        owner_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<Vec<Reservation>> {
        let sql = format!(
            "{} WHERE owner_id = ?1 AND end_ms >= ?2 AND start_ms <= ?2 ORDER BY start_ms",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(owner_id)
            .bind(to_ms(at))
            .fetch_all(&self.pool)
            .await?;

        into_reservations(rows)
    }

    /// Exact-key lookup.
    pub async fn get(&self, id: &str, start: DateTime<Utc>) -> DbResult<Option<Reservation>> {
        let sql = format!("{} WHERE id = ?1 AND start_ms = ?2", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .bind(to_ms(start))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Reservation::try_from).transpose()
    }

    /// Remote-origin reservations at `site` starting at or after `cutoff`.
    ///
    /// This is the window the sync engine is allowed to replace.
    pub async fn find_remote_from(
        &self,
        site: &str,
        cutoff: DateTime<Utc>,
    ) -> DbResult<Vec<Reservation>> {
        let sql = format!(
            "{} WHERE origin = ?1 AND site = ?2 AND start_ms >= ?3 ORDER BY start_ms",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(Origin::Remote)
            .bind(site)
            .bind(to_ms(cutoff))
            .fetch_all(&self.pool)
            .await?;

        into_reservations(rows)
    }

    /// Counts all reservations (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts or replaces a reservation keyed by `(id, start)`.
    pub async fn upsert(&self, reservation: &Reservation) -> DbResult<()> {
        debug!(key = %reservation.key(), origin = %reservation.origin, "Upserting reservation");

        let project_id = reservation.project_id.as_deref().unwrap_or(NO_PROJECT);

        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, start_ms, end_ms, site, owner_id, owner_name, origin,
                project_id, kind, priority, title, note, external_id, last_modified_ms
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12, ?13, ?14
            )
            ON CONFLICT (id, start_ms) DO UPDATE SET
                end_ms = excluded.end_ms,
                site = excluded.site,
                owner_id = excluded.owner_id,
                owner_name = excluded.owner_name,
                origin = excluded.origin,
                project_id = excluded.project_id,
                kind = excluded.kind,
                priority = excluded.priority,
                title = excluded.title,
                note = excluded.note,
                external_id = excluded.external_id,
                last_modified_ms = excluded.last_modified_ms
            "#,
        )
        .bind(&reservation.id)
        .bind(to_ms(reservation.start))
        .bind(to_ms(reservation.end))
        .bind(&reservation.site)
        .bind(&reservation.owner_id)
        .bind(&reservation.owner_name)
        .bind(reservation.origin)
        .bind(project_id)
        .bind(reservation.kind)
        .bind(reservation.priority)
        .bind(&reservation.title)
        .bind(&reservation.note)
        .bind(&reservation.external_id)
        .bind(to_ms(reservation.last_modified))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts each reservation independently.
    pub async fn batch_upsert(&self, reservations: &[Reservation]) -> BatchReport {
        let mut report = BatchReport::default();
        for reservation in reservations {
            let result = self.upsert(reservation).await;
            report.record(reservation.key(), result);
        }
        report
    }

    /// Deletes a reservation by key.
    ///
    /// ## Returns
    /// `true` if a row was removed.
    pub async fn delete(&self, id: &str, start: DateTime<Utc>) -> DbResult<bool> {
        debug!(id = %id, start = %start, "Deleting reservation");

        let result = sqlx::query("DELETE FROM reservations WHERE id = ?1 AND start_ms = ?2")
            .bind(id)
            .bind(to_ms(start))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes each key independently. Missing keys count as failures.
    pub async fn batch_delete(&self, keys: &[ReservationKey]) -> BatchReport {
        let mut report = BatchReport::default();
        for key in keys {
            let result = match self.delete(&key.id, key.start).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(DbError::not_found("Reservation", key.to_string())),
                Err(e) => Err(e),
            };
            report.record(key.clone(), result);
        }
        report
    }

    /// Attaches `project_id` to each reservation.
    pub async fn set_project(&self, keys: &[ReservationKey], project_id: &str) -> BatchReport {
        let mut report = BatchReport::default();
        for key in keys {
            let result = self.update_project(key, project_id).await;
            report.record(key.clone(), result);
        }
        report
    }

    /// Detaches any project from each reservation.
    pub async fn clear_project(&self, keys: &[ReservationKey]) -> BatchReport {
        self.set_project(keys, NO_PROJECT).await
    }

    async fn update_project(&self, key: &ReservationKey, project_id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE reservations SET project_id = ?3 WHERE id = ?1 AND start_ms = ?2")
                .bind(&key.id)
                .bind(to_ms(key.start))
                .bind(project_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Reservation", key.to_string()));
        }
        Ok(())
    }
}

/// Helper to generate a new local reservation ID.
pub fn generate_reservation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, h, m, 0).unwrap()
    }

    fn reservation(id: &str, site: &str, owner: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Reservation {
        Reservation {
            id: id.to_string(),
            start,
            end,
            site: site.to_string(),
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

    async fn repo() -> ReservationRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().reservations()
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let repo = repo().await;
        let mut r = reservation("a", "saf", "u1", at(16, 0), at(16, 30));
        r.priority = Priority::TimeCritical;
        r.project_id = Some("Orion#2024-05-01T00:00:00Z".to_string());

        repo.upsert(&r).await.unwrap();
        let loaded = repo.get("a", at(16, 0)).await.unwrap();

        assert_eq!(loaded, Some(r));
        assert!(repo.get("a", at(16, 1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_key() {
        let repo = repo().await;
        let mut r = reservation("a", "saf", "u1", at(16, 0), at(16, 30));
        repo.upsert(&r).await.unwrap();

        r.end = at(17, 0);
        r.title = "longer".to_string();
        repo.upsert(&r).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let loaded = repo.get("a", at(16, 0)).await.unwrap().unwrap();
        assert_eq!(loaded.end, at(17, 0));
    }

    #[tokio::test]
    async fn test_find_overlapping_is_half_open() {
        let repo = repo().await;
        repo.upsert(&reservation("a", "saf", "u1", at(16, 0), at(16, 30))).await.unwrap();
        repo.upsert(&reservation("b", "saf", "u1", at(17, 0), at(17, 30))).await.unwrap();
        repo.upsert(&reservation("c", "mrc1", "u1", at(16, 0), at(16, 30))).await.unwrap();

        let hits = repo.find_overlapping("saf", at(16, 15), at(16, 45)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        // touches both boundaries, overlaps neither
        let hits = repo.find_overlapping("saf", at(16, 30), at(17, 0)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_point_queries_are_inclusive() {
        let repo = repo().await;
        repo.upsert(&reservation("a", "saf", "u1", at(16, 0), at(16, 30))).await.unwrap();

        assert_eq!(repo.find_at_time_site("saf", at(16, 30)).await.unwrap().len(), 1);
        assert_eq!(repo.find_at_time_site("saf", at(16, 31)).await.unwrap().len(), 0);
        assert_eq!(repo.find_at_time_owner("u1", at(16, 0)).await.unwrap().len(), 1);
        assert_eq!(repo.find_at_time_owner("u2", at(16, 0)).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_range_queries() {
        let repo = repo().await;
        repo.upsert(&reservation("a", "saf", "u1", at(10, 0), at(11, 0))).await.unwrap();
        repo.upsert(&reservation("b", "saf", "u1", at(14, 0), at(15, 0))).await.unwrap();
        repo.upsert(&reservation("c", "saf", "u2", at(20, 0), at(21, 0))).await.unwrap();

        let in_range = repo.find_by_site_and_range("saf", at(12, 0), at(18, 0)).await.unwrap();
        assert_eq!(in_range.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["b"]);

        let upcoming = repo.find_by_owner_ending_after("u1", at(11, 0)).await.unwrap();
        assert_eq!(upcoming.len(), 2);
    }

    #[tokio::test]
    async fn test_find_remote_from_ignores_local_and_past() {
        let repo = repo().await;
        let mut past = reservation("p", "mrc1", "x#LCO", at(1, 0), at(2, 0));
        past.origin = Origin::Remote;
        past.external_id = Some("1".to_string());
        let mut future = reservation("f", "mrc1", "x#LCO", at(20, 0), at(21, 0));
        future.origin = Origin::Remote;
        future.external_id = Some("2".to_string());
        let local = reservation("l", "mrc1", "u1", at(22, 0), at(23, 0));

        for r in [&past, &future, &local] {
            repo.upsert(r).await.unwrap();
        }

        let window = repo.find_remote_from("mrc1", at(12, 0)).await.unwrap();
        assert_eq!(window, vec![future]);
    }

    #[tokio::test]
    async fn test_batch_delete_reports_missing() {
        let repo = repo().await;
        let r = reservation("a", "saf", "u1", at(16, 0), at(16, 30));
        repo.upsert(&r).await.unwrap();

        let report = repo
            .batch_delete(&[r.key(), ReservationKey::new("ghost", at(9, 0))])
            .await;

        assert_eq!(report.succeeded, vec![r.key()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key.id, "ghost");
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_batch_upsert_isolates_failures() {
        let repo = repo().await;
        let good = reservation("good", "saf", "u1", at(16, 0), at(16, 30));
        // violates CHECK (start_ms < end_ms)
        let bad = reservation("bad", "saf", "u1", at(16, 0), at(16, 0) - Duration::minutes(1));

        let report = repo.batch_upsert(&[bad, good.clone()]).await;

        assert_eq!(report.succeeded, vec![good.key()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_and_clear_project() {
        let repo = repo().await;
        let r = reservation("a", "saf", "u1", at(16, 0), at(16, 30));
        repo.upsert(&r).await.unwrap();

        let report = repo.set_project(&[r.key()], "Orion#2024-05-01T00:00:00Z").await;
        assert!(report.is_complete());
        let loaded = repo.get("a", at(16, 0)).await.unwrap().unwrap();
        assert_eq!(loaded.project_id.as_deref(), Some("Orion#2024-05-01T00:00:00Z"));

        repo.clear_project(&[r.key()]).await;
        let loaded = repo.get("a", at(16, 0)).await.unwrap().unwrap();
        assert_eq!(loaded.project_id, None);
    }
}
