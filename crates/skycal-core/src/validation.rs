//! # Input Validation
//!
//! Checks applied to direct (user-facing) requests before they reach the
//! store. Sync-imported records are validated by the translator instead.

use crate::error::ValidationError;
use crate::types::{Origin, Reservation};
use crate::{MAX_NOTE_LEN, MAX_TITLE_LEN, NO_PROJECT};

/// Validates a required, non-blank identifier field.
pub fn validate_required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates that a text field does not exceed `max` characters.
pub fn validate_max_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a complete reservation.
///
/// ## Rules
/// - `id`, `site` and `owner_id` are non-blank
/// - `start < end` (zero-duration reservations are rejected here)
/// - `external_id` is present exactly when the origin is remote
/// - the stored "no project" sentinel is not used as a real project id
pub fn validate_reservation(reservation: &Reservation) -> Result<(), ValidationError> {
    validate_required("id", &reservation.id)?;
    validate_required("site", &reservation.site)?;
    validate_required("owner_id", &reservation.owner_id)?;

    if reservation.start >= reservation.end {
        return Err(ValidationError::InvalidInterval {
            start: reservation.start.to_rfc3339(),
            end: reservation.end.to_rfc3339(),
        });
    }

    validate_max_len("title", &reservation.title, MAX_TITLE_LEN)?;
    validate_max_len("note", &reservation.note, MAX_NOTE_LEN)?;

    match (reservation.origin, reservation.external_id.as_deref()) {
        (Origin::Remote, None) => {
            return Err(ValidationError::Inconsistent {
                field: "external_id".to_string(),
                reason: "remote reservations must carry an external id".to_string(),
            })
        }
        (Origin::Local, Some(_)) => {
            return Err(ValidationError::Inconsistent {
                field: "external_id".to_string(),
                reason: "local reservations cannot carry an external id".to_string(),
            })
        }
        _ => {}
    }

    if let Some(project) = reservation.project_id.as_deref() {
        if project == NO_PROJECT || project.trim().is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "project_id".to_string(),
                reason: format!("'{}' is not a project id", project),
            });
        }
    }

    Ok(())
}
