//! # Watermark Repository
//!
//! Per-sub-resource record of the newest remote schedule version applied.
//! Absence of a row means the sub-resource has never been synced.
//!
//! `set` is an unconditional overwrite. Monotonicity is enforced by the sync
//! engine, which only calls `set` with a version newer than the stored one.

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use super::{from_ms, to_ms};
use crate::error::{DbError, DbResult};
use skycal_core::Watermark;

#[derive(Debug, FromRow)]
struct WatermarkRow {
    subresource_id: String,
    last_seen_remote_update: i64,
    updated_at: i64,
    skipped_last_pass: i64,
}

impl TryFrom<WatermarkRow> for Watermark {
    type Error = DbError;

    fn try_from(row: WatermarkRow) -> DbResult<Self> {
        Ok(Watermark {
            last_seen_remote_update: from_ms(
                "last_seen_remote_update",
                row.last_seen_remote_update,
            )?,
            updated_at: from_ms("updated_at", row.updated_at)?,
            skipped_last_pass: u32::try_from(row.skipped_last_pass).map_err(|_| {
                DbError::CorruptRow(format!(
                    "skipped_last_pass out of range: {}",
                    row.skipped_last_pass
                ))
            })?,
            subresource_id: row.subresource_id,
        })
    }
}

/// Repository for schedule watermarks.
#[derive(Debug, Clone)]
pub struct WatermarkRepository {
    pool: SqlitePool,
}

impl WatermarkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WatermarkRepository { pool }
    }

    /// Reads the watermark for a sub-resource.
    pub async fn get(&self, subresource_id: &str) -> DbResult<Option<Watermark>> {
        let row = sqlx::query_as::<_, WatermarkRow>(
            r#"
            SELECT subresource_id, last_seen_remote_update, updated_at, skipped_last_pass
            FROM schedule_watermarks
            WHERE subresource_id = ?1
            "#,
        )
        .bind(subresource_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Watermark::try_from).transpose()
    }

    /// Writes the watermark for a sub-resource, replacing any previous value.
    pub async fn set(&self, watermark: &Watermark) -> DbResult<()> {
        debug!(
            subresource = %watermark.subresource_id,
            version = %watermark.last_seen_remote_update,
            skipped = watermark.skipped_last_pass,
            "Writing schedule watermark"
        );

        sqlx::query(
            r#"
            INSERT INTO schedule_watermarks (
                subresource_id, last_seen_remote_update, updated_at, skipped_last_pass
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (subresource_id) DO UPDATE SET
                last_seen_remote_update = excluded.last_seen_remote_update,
                updated_at = excluded.updated_at,
                skipped_last_pass = excluded.skipped_last_pass
            "#,
        )
        .bind(&watermark.subresource_id)
        .bind(to_ms(watermark.last_seen_remote_update))
        .bind(to_ms(watermark.updated_at))
        .bind(i64::from(watermark.skipped_last_pass))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists every stored watermark, ordered by sub-resource.
    pub async fn list(&self) -> DbResult<Vec<Watermark>> {
        let rows = sqlx::query_as::<_, WatermarkRow>(
            r#"
            SELECT subresource_id, last_seen_remote_update, updated_at, skipped_last_pass
            FROM schedule_watermarks
            ORDER BY subresource_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Watermark::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_absent_then_overwrite() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().watermarks();
        assert!(repo.get("mrc1").await.unwrap().is_none());

        let t0 = Utc.with_ymd_and_hms(2024, 5, 14, 0, 0, 0).unwrap();
        let mut wm = Watermark {
            subresource_id: "mrc1".to_string(),
            last_seen_remote_update: t0,
            updated_at: t0,
            skipped_last_pass: 2,
        };
        repo.set(&wm).await.unwrap();
        assert_eq!(repo.get("mrc1").await.unwrap(), Some(wm.clone()));

        wm.last_seen_remote_update = t0 + chrono::Duration::hours(1);
        wm.skipped_last_pass = 0;
        repo.set(&wm).await.unwrap();
        assert_eq!(repo.get("mrc1").await.unwrap(), Some(wm.clone()));
        assert_eq!(repo.list().await.unwrap(), vec![wm]);
    }
}
