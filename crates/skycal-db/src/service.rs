//! # Calendar Service
//!
//! Direct (user-facing) reservation operations. Input arrives already
//! authenticated; the service enforces validation, ownership and conflicts.
//!
//! ## Modify Flow
//! ```text
//! modify(original_key, changes, requester)
//!      │
//!      ▼
//! load original ──────────────── missing ──► NotFound
//!      │
//!      ├── origin == remote ─────────────────► RemoteManaged
//!      ├── not owner and not admin ──────────► Unauthorized
//!      ▼
//! apply changes (id + owner preserved)
//!      │
//!      ▼
//! validate ─────────────────────── fails ──► Validation
//!      │
//!      ▼
//! conflict check (exclude_self) ─── hit ───► Conflict
//!      │
//!      ▼
//! upsert new key, then delete old key if start moved
//! ```

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::conflict::ConflictDetector;
use crate::error::{CalendarError, CalendarResult};
use crate::pool::Database;
use crate::repository::reservation::{generate_reservation_id, BatchReport, ReservationRepository};
use skycal_core::validation::{validate_required, validate_reservation};
use skycal_core::{
    CoreError, Origin, Priority, Requester, Reservation, ReservationChanges, ReservationKey,
    ReservationKind, ValidationError, NO_PROJECT,
};

/// Payload of a direct creation request.
#[derive(Debug, Clone)]
pub struct NewReservation {
    /// Client-chosen id; generated when absent.
    pub id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub site: String,
    pub owner_id: String,
    pub owner_name: String,
    pub title: String,
    pub note: String,
    pub kind: ReservationKind,
    pub priority: Priority,
    pub project_id: Option<String>,
}

impl NewReservation {
    fn into_reservation(self, now: DateTime<Utc>) -> Reservation {
        Reservation {
            id: self.id.unwrap_or_else(generate_reservation_id),
            start: self.start,
            end: self.end,
            site: self.site,
            owner_id: self.owner_id,
            owner_name: self.owner_name,
            origin: Origin::Local,
            project_id: self.project_id,
            kind: self.kind,
            priority: self.priority,
            title: self.title,
            note: self.note,
            external_id: None,
            last_modified: now,
        }
    }
}

/// Direct-request operations over the reservation store.
#[derive(Debug, Clone)]
pub struct CalendarService {
    reservations: ReservationRepository,
    conflicts: ConflictDetector,
}

impl CalendarService {
    pub fn new(db: &Database) -> Self {
        CalendarService {
            reservations: db.reservations(),
            conflicts: db.conflicts(),
        }
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Creates a local reservation.
    pub async fn create(&self, new: NewReservation) -> CalendarResult<Reservation> {
        let candidate = new.into_reservation(Utc::now());
        validate_reservation(&candidate)?;

        self.ensure_free(&candidate, false).await?;
        self.reservations.upsert(&candidate).await?;

        info!(
            key = %candidate.key(),
            site = %candidate.site,
            owner = %candidate.owner_id,
            "Reservation created"
        );
        Ok(candidate)
    }

    /// Modifies a local reservation owned by the requester (or any, for admins).
    pub async fn modify(
        &self,
        original_key: &ReservationKey,
        changes: &ReservationChanges,
        requester: &Requester,
    ) -> CalendarResult<Reservation> {
        let original = self.load_mutable(original_key, requester).await?;

        let updated = changes.apply_to(&original, Utc::now());
        validate_reservation(&updated)?;
        self.ensure_free(&updated, true).await?;

        // start is part of the key: write the new key first so a failed
        // write leaves the original in place
        self.reservations.upsert(&updated).await?;
        if updated.key() != original.key() {
            self.reservations
                .delete(&original.id, original.start)
                .await?;
        }

        info!(
            from = %original.key(),
            to = %updated.key(),
            requester = %requester.user_id,
            "Reservation modified"
        );
        Ok(updated)
    }

    /// Deletes a local reservation owned by the requester (or any, for admins).
    pub async fn delete(
        &self,
        key: &ReservationKey,
        requester: &Requester,
    ) -> CalendarResult<Reservation> {
        let original = self.load_mutable(key, requester).await?;

        if !self.reservations.delete(&original.id, original.start).await? {
            return Err(CoreError::NotFound(key.to_string()).into());
        }

        info!(key = %key, requester = %requester.user_id, "Reservation deleted");
        Ok(original)
    }

    /// Attaches a project to reservations.
    pub async fn attach_project(
        &self,
        keys: &[ReservationKey],
        project_id: &str,
    ) -> CalendarResult<BatchReport> {
        validate_required("project_id", project_id)?;
        if project_id == NO_PROJECT {
            return Err(ValidationError::InvalidFormat {
                field: "project_id".to_string(),
                reason: format!("'{}' is not a project id", project_id),
            }
            .into());
        }

        let report = self.reservations.set_project(keys, project_id).await;
        info!(
            project = %project_id,
            attached = report.succeeded.len(),
            failed = report.failed.len(),
            "Project attached"
        );
        Ok(report)
    }

    /// Detaches any project from reservations.
    pub async fn detach_project(&self, keys: &[ReservationKey]) -> BatchReport {
        let report = self.reservations.clear_project(keys).await;
        info!(
            detached = report.succeeded.len(),
            failed = report.failed.len(),
            "Project detached"
        );
        report
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub async fn is_user_scheduled(
        &self,
        user_id: &str,
        site: &str,
        at: DateTime<Utc>,
    ) -> CalendarResult<bool> {
        Ok(self.conflicts.is_user_scheduled(user_id, site, at).await?)
    }

    pub async fn does_conflicting_event_exist(
        &self,
        user_id: &str,
        site: &str,
        at: DateTime<Utc>,
    ) -> CalendarResult<bool> {
        Ok(self
            .conflicts
            .does_conflicting_event_exist(user_id, site, at)
            .await?)
    }

    /// Reservations at `site` ending within the range.
    pub async fn site_events_in_range(
        &self,
        site: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> CalendarResult<Vec<Reservation>> {
        if range_start > range_end {
            return Err(ValidationError::InvalidInterval {
                start: range_start.to_rfc3339(),
                end: range_end.to_rfc3339(),
            }
            .into());
        }
        Ok(self
            .reservations
            .find_by_site_and_range(site, range_start, range_end)
            .await?)
    }

    pub async fn user_events_ending_after(
        &self,
        owner_id: &str,
        after: DateTime<Utc>,
    ) -> CalendarResult<Vec<Reservation>> {
        Ok(self
            .reservations
            .find_by_owner_ending_after(owner_id, after)
            .await?)
    }

    pub async fn events_at_time(
        &self,
        site: &str,
        at: DateTime<Utc>,
    ) -> CalendarResult<Vec<Reservation>> {
        Ok(self.reservations.find_at_time_site(site, at).await?)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn load_mutable(
        &self,
        key: &ReservationKey,
        requester: &Requester,
    ) -> CalendarResult<Reservation> {
        let original = self
            .reservations
            .get(&key.id, key.start)
            .await?
            .ok_or_else(|| CoreError::NotFound(key.to_string()))?;

        if original.is_remote() {
            warn!(key = %key, requester = %requester.user_id, "Rejected edit of imported reservation");
            return Err(CoreError::RemoteManaged(key.to_string()).into());
        }

        if !requester.can_mutate(&original) {
            warn!(key = %key, requester = %requester.user_id, "Rejected edit by non-owner");
            return Err(CoreError::unauthorized("You may only modify your own events.").into());
        }

        Ok(original)
    }

    async fn ensure_free(&self, candidate: &Reservation, exclude_self: bool) -> CalendarResult<()> {
        if let Some(existing) = self.conflicts.find_conflict(candidate, exclude_self).await? {
            return Err(CalendarError::Core(CoreError::Conflict {
                site: candidate.site.clone(),
                existing: existing.key().to_string(),
            }));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 14, h, m, 0).unwrap()
    }

    fn new(id: &str, owner: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> NewReservation {
        NewReservation {
            id: Some(id.to_string()),
            start,
            end,
            site: "saf".to_string(),
            owner_id: owner.to_string(),
            owner_name: owner.to_string(),
            title: String::new(),
            note: String::new(),
            kind: ReservationKind::Realtime,
            priority: Priority::Standard,
            project_id: None,
        }
    }

    async fn setup() -> (Database, CalendarService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = CalendarService::new(&db);
        (db, service)
    }

    #[tokio::test]
    async fn test_create_rejects_other_owner_overlap() {
        let (_db, service) = setup().await;
        service.create(new("a", "u1", at(16, 0), at(16, 30))).await.unwrap();

        let err = service
            .create(new("b", "u2", at(16, 15), at(16, 45)))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Core(CoreError::Conflict { .. })));

        // same owner may overlap their own reservation
        service.create(new("c", "u1", at(16, 15), at(16, 45))).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_validates() {
        let (_db, service) = setup().await;
        let err = service
            .create(new("a", "u1", at(16, 0), at(16, 0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CalendarError::Core(CoreError::Validation(ValidationError::InvalidInterval { .. }))
        ));
    }

    #[tokio::test]
    async fn test_create_generates_id() {
        let (_db, service) = setup().await;
        let mut request = new("ignored", "u1", at(16, 0), at(16, 30));
        request.id = None;
        let created = service.create(request).await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.origin, Origin::Local);
    }

    #[tokio::test]
    async fn test_modify_moves_key_and_keeps_identity() {
        let (db, service) = setup().await;
        let created = service.create(new("a", "u1", at(16, 0), at(16, 30))).await.unwrap();

        let changes = ReservationChanges {
            start: Some(at(16, 10)),
            end: Some(at(16, 40)),
            ..Default::default()
        };
        let updated = service
            .modify(&created.key(), &changes, &Requester::user("u1"))
            .await
            .unwrap();

        assert_eq!(updated.id, "a");
        assert_eq!(updated.owner_id, "u1");
        assert!(db.reservations().get("a", at(16, 0)).await.unwrap().is_none());
        assert!(db.reservations().get("a", at(16, 10)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_admin_modify_does_not_conflict_with_itself() {
        let (_db, service) = setup().await;
        let created = service.create(new("a", "u1", at(16, 0), at(16, 30))).await.unwrap();

        let changes = ReservationChanges {
            end: Some(at(16, 45)),
            ..Default::default()
        };
        let updated = service
            .modify(&created.key(), &changes, &Requester::admin("root"))
            .await
            .unwrap();
        assert_eq!(updated.owner_id, "u1");
    }

    #[tokio::test]
    async fn test_modify_and_delete_require_ownership() {
        let (_db, service) = setup().await;
        let created = service.create(new("a", "u1", at(16, 0), at(16, 30))).await.unwrap();

        let err = service
            .modify(&created.key(), &ReservationChanges::default(), &Requester::user("u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Core(CoreError::Unauthorized { .. })));

        let err = service
            .delete(&created.key(), &Requester::user("u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Core(CoreError::Unauthorized { .. })));

        service.delete(&created.key(), &Requester::admin("root")).await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_reservations_are_read_only() {
        let (db, service) = setup().await;
        let imported = Reservation {
            id: "remote-1".to_string(),
            start: at(18, 0),
            end: at(19, 0),
            site: "mrc1".to_string(),
            owner_id: "astro#LCO".to_string(),
            owner_name: "astro".to_string(),
            origin: Origin::Remote,
            project_id: None,
            kind: ReservationKind::Project,
            priority: Priority::Standard,
            title: String::new(),
            note: String::new(),
            external_id: Some("1".to_string()),
            last_modified: at(0, 0),
        };
        db.reservations().upsert(&imported).await.unwrap();

        let err = service
            .delete(&imported.key(), &Requester::admin("root"))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Core(CoreError::RemoteManaged(_))));
    }

    #[tokio::test]
    async fn test_missing_reservation() {
        let (_db, service) = setup().await;
        let err = service
            .delete(&ReservationKey::new("ghost", at(1, 0)), &Requester::admin("root"))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Core(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_project_attach_detach() {
        let (db, service) = setup().await;
        let created = service.create(new("a", "u1", at(16, 0), at(16, 30))).await.unwrap();

        assert!(service.attach_project(&[created.key()], NO_PROJECT).await.is_err());

        let report = service
            .attach_project(&[created.key()], "Orion#2030-01-01T00:00:00Z")
            .await
            .unwrap();
        assert!(report.is_complete());

        service.detach_project(&[created.key()]).await;
        let loaded = db.reservations().get("a", at(16, 0)).await.unwrap().unwrap();
        assert!(loaded.project_id.is_none());
    }

    #[tokio::test]
    async fn test_point_queries() {
        let (_db, service) = setup().await;
        service.create(new("a", "u1", at(16, 0), at(16, 30))).await.unwrap();

        assert!(service.is_user_scheduled("u1", "saf", at(16, 5)).await.unwrap());
        assert!(service.does_conflicting_event_exist("u2", "saf", at(16, 5)).await.unwrap());
        assert_eq!(service.events_at_time("saf", at(16, 5)).await.unwrap().len(), 1);
        assert_eq!(
            service
                .site_events_in_range("saf", at(0, 0), at(23, 0))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(service.site_events_in_range("saf", at(2, 0), at(1, 0)).await.is_err());
    }
}
