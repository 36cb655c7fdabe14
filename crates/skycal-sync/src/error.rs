//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │     Pass                │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Unavailable    │  │  UnknownSubresource     │ │
//! │  │  InvalidUrl     │  │  Malformed      │  │  DatabaseError          │ │
//! │  │  ConfigLoad/Save│  │  Registry       │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Every error here aborts at most ONE sub-resource's pass.              │
//! │  Per-observation failures are not errors: they are listed in the       │
//! │  pass report (see report.rs).                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote scheduler could not be reached, answered with an error
    /// status, or did not answer within the fetch timeout.
    ///
    /// ## When This Occurs
    /// - DNS / TCP / TLS failure
    /// - Non-2xx response after retries
    /// - Fetch timeout elapsed
    #[error("Remote scheduler unavailable for {subresource}: {reason}")]
    RemoteUnavailable { subresource: String, reason: String },

    /// The remote answered, but the payload cannot be parsed at all.
    #[error("Malformed remote schedule for {subresource}: {reason}")]
    RemoteScheduleMalformed { subresource: String, reason: String },

    /// The projects backend rejected or failed a request.
    #[error("Project registry error: {0}")]
    Registry(String),

    // =========================================================================
    // Pass Errors
    // =========================================================================
    /// No configuration exists for the requested sub-resource.
    #[error("Unknown sub-resource: {0}")]
    UnknownSubresource(String),

    /// Database query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Internal error (e.g. a pass task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn unavailable(subresource: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::RemoteUnavailable {
            subresource: subresource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(subresource: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::RemoteScheduleMalformed {
            subresource: subresource.into(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<skycal_db::DbError> for SyncError {
    fn from(err: skycal_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the next periodic pass may succeed without any change.
    ///
    /// ## Retryable Errors
    /// - Remote unreachable / timed out
    /// - Registry failures
    /// - Database errors (pool exhausted, busy)
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Unknown sub-resources
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable { .. }
                | SyncError::Registry(_)
                | SyncError::DatabaseError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::UnknownSubresource(_)
        )
    }

    /// Returns true if the remote side is at fault.
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable { .. } | SyncError::RemoteScheduleMalformed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::unavailable("mrc1", "timed out").is_retryable());
        assert!(SyncError::Registry("503".into()).is_retryable());

        assert!(!SyncError::malformed("mrc1", "not json").is_retryable());
        assert!(!SyncError::UnknownSubresource("xyz".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::unavailable("mrc1", "connection refused");
        assert_eq!(
            err.to_string(),
            "Remote scheduler unavailable for mrc1: connection refused"
        );
        assert!(err.is_remote_error());
        assert!(SyncError::UnknownSubresource("x".into()).is_config_error());
    }
}
