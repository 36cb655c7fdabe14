//! # Schedule Translator
//!
//! Maps remote scheduler observations into local reservations and projects.
//!
//! ## Translation Flow
//! ```text
//! RemoteObservation { site: "mrc", telescope: "0m31", id: 1234, ... }
//!        │
//!        ▼
//! SiteMap::resolve("mrc", "0m31") ──► "mrc1"   (else UnmappedSubresource)
//!        │
//!        ▼
//! "mrc1" == sub-resource being synced?        (else ForeignSubresource)
//!        │
//!        ▼
//! parse start / end / created / modified      (else InvalidTimestamp)
//!        │
//!        ▼
//! id = uuid_v5(NAMESPACE, "mrc:1234")         deterministic, re-syncs overwrite
//!        │
//!        ▼
//! TranslatedObservation { reservation, project }
//! ```
//!
//! The site map is built once from configuration and injected; nothing here
//! reads global state.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::error::TranslateError;
use crate::remote::{ExposureSet, ProjectConstraints, ProjectTarget, RemoteObservation, RemoteProject};
use crate::types::{Origin, Reservation, ReservationKind};
use crate::DEFAULT_REMOTE_LABEL;

/// Namespace for deterministic reservation ids of imported observations.
pub const REMOTE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5c1c_a1e0_7a3b_4d2e_9f10_6b8e_2d4c_0a71);

/// Note attached to every imported reservation.
pub const IMPORTED_NOTE: &str = "This event was created and scheduled by the LCO Scheduler";

/// Note attached to every imported project.
pub const IMPORTED_PROJECT_NOTE: &str = "Created automatically with the LCO scheduler";

// =============================================================================
// Site Map
// =============================================================================

/// Immutable lookup from `(remote site, telescope id)` to a local site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteMap {
    forward: BTreeMap<(String, String), String>,
    reverse: BTreeMap<String, (String, String)>,
}

impl SiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping. Later entries replace earlier ones that share either
    /// the remote pair or the local site, so the map stays one-to-one.
    pub fn with(
        mut self,
        remote_site: impl Into<String>,
        telescope: impl Into<String>,
        local_site: impl Into<String>,
    ) -> Self {
        let key = (remote_site.into(), telescope.into());
        let local_site = local_site.into();
        if let Some(previous) = self.forward.insert(key.clone(), local_site.clone()) {
            self.reverse.remove(&previous);
        }
        if let Some(stale) = self.reverse.insert(local_site, key.clone()) {
            if stale != key {
                self.forward.remove(&stale);
            }
        }
        self
    }

    /// Local site for a remote `(site, telescope)` pair.
    pub fn resolve(&self, remote_site: &str, telescope: &str) -> Option<&str> {
        self.forward
            .get(&(remote_site.to_string(), telescope.to_string()))
            .map(String::as_str)
    }

    /// Remote `(site, telescope)` pair for a local site.
    pub fn reverse(&self, local_site: &str) -> Option<(&str, &str)> {
        self.reverse
            .get(local_site)
            .map(|(site, telescope)| (site.as_str(), telescope.as_str()))
    }

    /// All mapped local sites, sorted.
    pub fn sites(&self) -> impl Iterator<Item = &str> {
        self.reverse.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

// =============================================================================
// Translator
// =============================================================================

/// Result of translating one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedObservation {
    pub reservation: Reservation,
    pub project: RemoteProject,
}

/// Translates remote observations for one deployment.
#[derive(Debug, Clone)]
pub struct ScheduleTranslator {
    sites: SiteMap,
    label: String,
}

impl ScheduleTranslator {
    pub fn new(sites: SiteMap) -> Self {
        ScheduleTranslator {
            sites,
            label: DEFAULT_REMOTE_LABEL.to_string(),
        }
    }

    /// Overrides the scheduler label used in owner ids and titles.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn sites(&self) -> &SiteMap {
        &self.sites
    }

    /// Deterministic local id of a remote observation.
    pub fn reservation_id(remote_site: &str, external_id: &str) -> String {
        let name = format!("{}:{}", remote_site, external_id);
        Uuid::new_v5(&REMOTE_ID_NAMESPACE, name.as_bytes()).to_string()
    }

    /// Translates one observation destined for `subresource_id`.
    pub fn translate(
        &self,
        subresource_id: &str,
        obs: &RemoteObservation,
    ) -> Result<TranslatedObservation, TranslateError> {
        let site = self
            .sites
            .resolve(&obs.site, &obs.telescope)
            .ok_or_else(|| TranslateError::UnmappedSubresource {
                remote_site: obs.site.clone(),
                telescope: obs.telescope.clone(),
            })?;

        if site != subresource_id {
            return Err(TranslateError::ForeignSubresource {
                expected: subresource_id.to_string(),
                actual: site.to_string(),
            });
        }

        // the store keeps milliseconds; keys must compare equal after a round trip
        let start = to_store_precision(parse_timestamp("start", &obs.start)?);
        let end = to_store_precision(parse_timestamp("end", &obs.end)?);
        let created = parse_timestamp("created", &obs.created)?;
        let modified = to_store_precision(parse_timestamp("modified", &obs.modified)?);

        if start >= end {
            return Err(TranslateError::InvalidInterval {
                start: obs.start.clone(),
                end: obs.end.clone(),
            });
        }

        let external_id = obs.id.to_string();
        let id = Self::reservation_id(&obs.site, &external_id);
        let owner_id = format!("{}#{}", obs.submitter, self.label);
        let created_at = whole_seconds(created);
        let project_id = format!("{}#{}", obs.name, created_at);

        let reservation = Reservation {
            id: id.clone(),
            start,
            end,
            site: site.to_string(),
            owner_id: owner_id.clone(),
            owner_name: obs.submitter.clone(),
            origin: Origin::Remote,
            project_id: Some(project_id.clone()),
            kind: ReservationKind::Project,
            priority: obs.priority(),
            title: format!("{} (via {})", obs.name, self.label),
            note: IMPORTED_NOTE.to_string(),
            external_id: Some(external_id),
            last_modified: modified,
        };

        let project = self.build_project(obs, site, project_id, owner_id, created_at, start, end, id);

        Ok(TranslatedObservation {
            reservation,
            project,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_project(
        &self,
        obs: &RemoteObservation,
        site: &str,
        project_id: String,
        owner_id: String,
        created_at: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reservation_id: String,
    ) -> RemoteProject {
        // only the first configuration is carried over
        let configuration = obs.request.configurations.first();

        let targets = configuration
            .map(|c| {
                vec![ProjectTarget {
                    name: c.target.name.clone(),
                    ra: c.target.ra / 15.0,
                    dec: c.target.dec,
                }]
            })
            .unwrap_or_default();

        let exposures = configuration
            .map(|c| {
                c.instrument_configs
                    .iter()
                    .map(|ic| ExposureSet {
                        exposure: ic.exposure_time,
                        count: ic.exposure_count,
                        filter: ic.optical_elements.filter.clone(),
                        imtype: c.config_type.clone(),
                        zoom: ic.mode.clone(),
                        angle: ic.extra_params.rotator_angle,
                        offset_ra: ic.extra_params.offset_ra,
                        offset_dec: ic.extra_params.offset_dec,
                        defocus: ic.extra_params.defocus,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let constraints = configuration.and_then(|c| {
            c.instrument_configs.first().map(|ic| ProjectConstraints {
                ra_offset: ic.extra_params.offset_ra,
                dec_offset: ic.extra_params.offset_dec,
                defocus: ic.extra_params.defocus,
                lunar_phase_max: c.constraints.max_lunar_phase * 100.0,
                lunar_dist_min: c.constraints.min_lunar_distance,
                max_airmass: c.constraints.max_airmass,
                project_is_active: true,
            })
        });

        RemoteProject {
            project_id,
            project_name: obs.name.clone(),
            owner_id,
            owner_name: format!("{} (via {})", obs.submitter, self.label),
            created_at,
            start_date: whole_seconds(start),
            expiry_date: whole_seconds(end),
            sites: vec![site.to_string()],
            priority: obs.priority(),
            note: IMPORTED_PROJECT_NOTE.to_string(),
            targets,
            exposures,
            constraints,
            scheduled_with: vec![reservation_id],
            origin: self.label.clone(),
        }
    }
}

// =============================================================================
// Timestamp Helpers
// =============================================================================

/// Parses an RFC 3339 timestamp, or a naive ISO timestamp taken as UTC.
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, TranslateError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| TranslateError::InvalidTimestamp {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// Truncates an instant to the millisecond precision the store persists.
pub fn to_store_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

fn whole_seconds(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{
        Configuration, Constraints, ExternalId, ExtraParams, InstrumentConfig, ObservationRequest,
        ObservationState, OpticalElements, Target,
    };
    use crate::types::Priority;
    use chrono::TimeZone;

    fn site_map() -> SiteMap {
        SiteMap::new()
            .with("mrc", "0m31", "mrc1")
            .with("mrc", "0m61", "mrc2")
            .with("aro", "0m3", "aro1")
    }

    fn observation(id: i64, telescope: &str) -> RemoteObservation {
        RemoteObservation {
            id: ExternalId::Number(id),
            site: "mrc".to_string(),
            telescope: telescope.to_string(),
            start: "2024-05-14T03:00:00Z".to_string(),
            end: "2024-05-14T03:30:00Z".to_string(),
            submitter: "astro".to_string(),
            name: "M31 deep".to_string(),
            observation_type: "NORMAL".to_string(),
            state: ObservationState::Pending,
            created: "2024-05-01T10:00:00.123456Z".to_string(),
            modified: "2024-05-02T10:00:00Z".to_string(),
            request: ObservationRequest {
                state: Some("PENDING".to_string()),
                configurations: vec![Configuration {
                    config_type: "EXPOSE".to_string(),
                    target: Target {
                        name: Some("M31".to_string()),
                        ra: 15.0,
                        dec: 41.0,
                    },
                    instrument_configs: vec![InstrumentConfig {
                        exposure_count: 3,
                        exposure_time: 60.0,
                        mode: "full".to_string(),
                        extra_params: ExtraParams::default(),
                        optical_elements: OpticalElements {
                            filter: "rp".to_string(),
                        },
                    }],
                    constraints: Constraints {
                        max_airmass: 2.0,
                        max_lunar_phase: 0.5,
                        min_lunar_distance: 30.0,
                    },
                }],
            },
        }
    }

    #[test]
    fn test_site_map_lookup() {
        let map = site_map();
        assert_eq!(map.resolve("mrc", "0m61"), Some("mrc2"));
        assert_eq!(map.resolve("mrc", "1m0"), None);
        assert_eq!(map.reverse("aro1"), Some(("aro", "0m3")));
        assert_eq!(map.sites().collect::<Vec<_>>(), vec!["aro1", "mrc1", "mrc2"]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_translate_maps_fields() {
        let translator = ScheduleTranslator::new(site_map());
        let out = translator.translate("mrc1", &observation(1234, "0m31")).unwrap();
        let r = &out.reservation;

        assert_eq!(r.site, "mrc1");
        assert_eq!(r.origin, Origin::Remote);
        assert_eq!(r.kind, ReservationKind::Project);
        assert_eq!(r.owner_id, "astro#LCO");
        assert_eq!(r.title, "M31 deep (via LCO)");
        assert_eq!(r.external_id.as_deref(), Some("1234"));
        assert_eq!(r.start, Utc.with_ymd_and_hms(2024, 5, 14, 3, 0, 0).unwrap());
        assert_eq!(r.project_id.as_deref(), Some("M31 deep#2024-05-01T10:00:00Z"));

        let p = &out.project;
        assert_eq!(p.owner_name, "astro (via LCO)");
        assert_eq!(p.targets[0].ra, 1.0);
        assert_eq!(p.exposures[0].count, 3);
        assert_eq!(p.constraints.as_ref().map(|c| c.lunar_phase_max), Some(50.0));
        assert_eq!(p.scheduled_with, vec![r.id.clone()]);
    }

    #[test]
    fn test_translate_is_deterministic() {
        let translator = ScheduleTranslator::new(site_map());
        let a = translator.translate("mrc1", &observation(7, "0m31")).unwrap();
        let b = translator.translate("mrc1", &observation(7, "0m31")).unwrap();
        let c = translator.translate("mrc1", &observation(8, "0m31")).unwrap();

        assert_eq!(a.reservation.id, b.reservation.id);
        assert_ne!(a.reservation.id, c.reservation.id);
    }

    #[test]
    fn test_unmapped_telescope() {
        let translator = ScheduleTranslator::new(site_map());
        let err = translator.translate("mrc1", &observation(1, "2m0")).unwrap_err();
        assert_eq!(
            err,
            TranslateError::UnmappedSubresource {
                remote_site: "mrc".to_string(),
                telescope: "2m0".to_string(),
            }
        );
    }

    #[test]
    fn test_foreign_subresource() {
        let translator = ScheduleTranslator::new(site_map());
        let err = translator.translate("mrc1", &observation(1, "0m61")).unwrap_err();
        assert!(matches!(err, TranslateError::ForeignSubresource { .. }));
    }

    #[test]
    fn test_bad_timestamp_and_interval() {
        let translator = ScheduleTranslator::new(site_map());

        let mut obs = observation(1, "0m31");
        obs.start = "yesterday".to_string();
        assert!(matches!(
            translator.translate("mrc1", &obs),
            Err(TranslateError::InvalidTimestamp { field, .. }) if field == "start"
        ));

        let mut obs = observation(1, "0m31");
        obs.end = obs.start.clone();
        assert!(matches!(
            translator.translate("mrc1", &obs),
            Err(TranslateError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_time_critical_and_label() {
        let translator = ScheduleTranslator::new(site_map()).with_label("OBS");
        let mut obs = observation(1, "0m31");
        obs.observation_type = "TIME_CRITICAL".to_string();
        obs.request.configurations.clear();

        let out = translator.translate("mrc1", &obs).unwrap();
        assert_eq!(out.reservation.priority, Priority::TimeCritical);
        assert_eq!(out.reservation.owner_id, "astro#OBS");
        assert!(out.project.targets.is_empty());
        assert!(out.project.constraints.is_none());
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let parsed = parse_timestamp("start", "2024-05-14T03:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 14, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_site_map_rebinding_local_site_drops_old_pair() {
        let map = SiteMap::new()
            .with("mrc", "0m31", "mrc1")
            .with("mrc", "0m61", "mrc1");

        assert_eq!(map.resolve("mrc", "0m61"), Some("mrc1"));
        assert_eq!(map.resolve("mrc", "0m31"), None);
        assert_eq!(map.reverse("mrc1"), Some(("mrc", "0m61")));
        assert_eq!(map.len(), 1);
        assert_eq!(map.sites().count(), 1);
    }

    #[test]
    fn test_translate_truncates_to_store_precision() {
        let translator = ScheduleTranslator::new(site_map());
        let mut obs = observation(7, "0m31");
        obs.start = "2024-05-14T03:00:00.123456Z".to_string();
        obs.end = "2024-05-14T03:30:00.987654Z".to_string();
        obs.modified = "2024-05-02T10:00:00.000999Z".to_string();

        let r = translator.translate("mrc1", &obs).unwrap().reservation;
        let base = Utc.with_ymd_and_hms(2024, 5, 14, 3, 0, 0).unwrap();
        assert_eq!(r.start, base + chrono::Duration::milliseconds(123));
        assert_eq!(
            r.end,
            base + chrono::Duration::minutes(30) + chrono::Duration::milliseconds(987)
        );
        assert_eq!(
            r.last_modified,
            Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_interval_collapsing_below_a_millisecond_is_rejected() {
        let translator = ScheduleTranslator::new(site_map());
        let mut obs = observation(8, "0m31");
        obs.start = "2024-05-14T03:00:00.000100Z".to_string();
        obs.end = "2024-05-14T03:00:00.000900Z".to_string();

        let err = translator.translate("mrc1", &obs).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidInterval { .. }));
    }
}
