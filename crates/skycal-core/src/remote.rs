//! # Remote Scheduler Schema
//!
//! Serde types for the remote scheduler's native observation records, and
//! the project record derived from each imported observation.
//!
//! ## Naming
//! ```text
//! Remote scheduler               Local calendar
//! ─────────────────              ──────────────
//! site      "mrc"   ─┐
//!                    ├─ SiteMap ─► site "mrc1"   (one sub-resource)
//! telescope "0m31"  ─┘
//! ```
//!
//! The remote "site" is a grouping of telescopes; a local site is a single
//! telescope. Every nested field below is defaulted so a sparse request body
//! still decodes; only the top-level identity and timing fields are required.

use serde::{Deserialize, Serialize};

use crate::types::Priority;

// =============================================================================
// External Id
// =============================================================================

/// Observation identifier in the remote scheduler.
///
/// The scheduler emits integers, but string ids are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalId::Number(n) => write!(f, "{}", n),
            ExternalId::Text(s) => write!(f, "{}", s),
        }
    }
}

// =============================================================================
// Observation State
// =============================================================================

/// Lifecycle state of a remote observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationState {
    Pending,
    InProgress,
    NotAttempted,
    Completed,
    /// Replaced by a later schedule.
    Canceled,
    Aborted,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ObservationState {
    /// Only pending observations are imported as reservations.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, ObservationState::Pending)
    }
}

// =============================================================================
// Remote Observation
// =============================================================================

/// One scheduled observation as returned by the site proxy.
///
/// Timestamps are kept as strings; the translator parses them so a single
/// bad value skips one observation instead of failing the whole payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObservation {
    pub id: ExternalId,
    /// Remote site code, e.g. `"mrc"`.
    pub site: String,
    /// Remote telescope id, e.g. `"0m31"`.
    pub telescope: String,
    pub start: String,
    pub end: String,
    pub submitter: String,
    pub name: String,
    #[serde(default)]
    pub observation_type: String,
    pub state: ObservationState,
    pub created: String,
    pub modified: String,
    #[serde(default)]
    pub request: ObservationRequest,
}

impl RemoteObservation {
    /// Rapid-response and time-critical observations are imported with
    /// elevated priority.
    pub fn priority(&self) -> Priority {
        match self.observation_type.as_str() {
            "RAPID_RESPONSE" | "TIME_CRITICAL" => Priority::TimeCritical,
            _ => Priority::Standard,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationRequest {
    pub state: Option<String>,
    pub configurations: Vec<Configuration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(rename = "type")]
    pub config_type: String,
    pub target: Target,
    pub instrument_configs: Vec<InstrumentConfig>,
    pub constraints: Constraints,
}

/// Target coordinates in degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Target {
    pub name: Option<String>,
    pub ra: f64,
    pub dec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub exposure_count: u32,
    pub exposure_time: f64,
    pub mode: String,
    pub extra_params: ExtraParams,
    pub optical_elements: OpticalElements,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraParams {
    pub offset_ra: f64,
    pub offset_dec: f64,
    pub rotator_angle: f64,
    pub defocus: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalElements {
    pub filter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub max_airmass: f64,
    /// Fraction in `[0, 1]`.
    pub max_lunar_phase: f64,
    pub min_lunar_distance: f64,
}

// =============================================================================
// Remote Project
// =============================================================================

/// Project record created for each imported observation.
///
/// Serialized in the projects backend's field naming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteProject {
    /// `"{name}#{created}"`, created truncated to whole seconds.
    pub project_id: String,
    pub project_name: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(rename = "username")]
    pub owner_name: String,
    pub created_at: String,
    pub start_date: String,
    pub expiry_date: String,
    #[serde(rename = "project_sites")]
    pub sites: Vec<String>,
    #[serde(rename = "project_priority")]
    pub priority: Priority,
    #[serde(rename = "project_note")]
    pub note: String,
    #[serde(rename = "project_targets")]
    pub targets: Vec<ProjectTarget>,
    pub exposures: Vec<ExposureSet>,
    #[serde(rename = "project_constraints")]
    pub constraints: Option<ProjectConstraints>,
    /// Reservation ids this project runs under.
    #[serde(rename = "scheduled_with_events")]
    pub scheduled_with: Vec<String>,
    pub origin: String,
}

/// Target with right ascension in hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTarget {
    pub name: Option<String>,
    pub ra: f64,
    pub dec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSet {
    pub exposure: f64,
    pub count: u32,
    pub filter: String,
    pub imtype: String,
    pub zoom: String,
    pub angle: f64,
    pub offset_ra: f64,
    pub offset_dec: f64,
    pub defocus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConstraints {
    pub ra_offset: f64,
    pub dec_offset: f64,
    pub defocus: f64,
    /// Percent, `[0, 100]`.
    pub lunar_phase_max: f64,
    pub lunar_dist_min: f64,
    pub max_airmass: f64,
    pub project_is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": 1234,
        "site": "mrc",
        "telescope": "0m31",
        "start": "2024-05-14T03:00:00Z",
        "end": "2024-05-14T03:30:00Z",
        "submitter": "astro",
        "name": "M31 deep",
        "observation_type": "RAPID_RESPONSE",
        "state": "PENDING",
        "created": "2024-05-01T10:00:00.123456Z",
        "modified": "2024-05-02T10:00:00Z",
        "request": {
            "state": "PENDING",
            "configurations": [{
                "type": "EXPOSE",
                "target": {"name": "M31", "ra": 10.68, "dec": 41.27},
                "constraints": {"max_airmass": 2.0, "max_lunar_phase": 0.5, "min_lunar_distance": 30},
                "instrument_configs": [{
                    "exposure_count": 3,
                    "exposure_time": 60,
                    "mode": "full",
                    "extra_params": {"offset_ra": 0, "offset_dec": 0, "rotator_angle": 0},
                    "optical_elements": {"filter": "rp"}
                }]
            }]
        }
    }"#;

    #[test]
    fn test_decode_observation() {
        let obs: RemoteObservation = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(obs.id, ExternalId::Number(1234));
        assert_eq!(obs.id.to_string(), "1234");
        assert_eq!(obs.state, ObservationState::Pending);
        assert_eq!(obs.priority(), Priority::TimeCritical);
        assert_eq!(obs.request.configurations[0].config_type, "EXPOSE");
        assert_eq!(obs.request.configurations[0].instrument_configs[0].exposure_count, 3);
    }

    #[test]
    fn test_unknown_state_and_sparse_request() {
        let obs: RemoteObservation = serde_json::from_str(
            r#"{"id": "abc", "site": "aro", "telescope": "0m3",
                "start": "2024-05-14T03:00:00Z", "end": "2024-05-14T04:00:00Z",
                "submitter": "x", "name": "y", "state": "SOMETHING_NEW",
                "created": "2024-05-01T00:00:00Z", "modified": "2024-05-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(obs.id, ExternalId::Text("abc".to_string()));
        assert_eq!(obs.state, ObservationState::Unknown);
        assert!(!obs.state.is_schedulable());
        assert!(obs.request.configurations.is_empty());
        assert_eq!(obs.priority(), Priority::Standard);
    }
}
