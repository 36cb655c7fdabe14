//! # Project Registry
//!
//! Keeps the projects backend aware of projects created for imported
//! observations. Optional: without a configured backend the engine uses
//! [`NoOpRegistry`].
//!
//! Registry failures never abort a pass; the engine records them in the
//! pass report.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::{SyncError, SyncResult};
use skycal_core::{RemoteProject, NO_PROJECT};

/// Destination for projects derived from remote observations.
#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    /// Creates or replaces a project.
    async fn register(&self, project: &RemoteProject) -> SyncResult<()>;

    /// Removes projects whose reservations were pruned.
    async fn retire(&self, project_ids: &[String]) -> SyncResult<()>;
}

/// Drops sentinel ids ("none", "none#") and duplicates, preserving order.
pub fn retirable_ids(project_ids: &[String]) -> Vec<String> {
    let sentinel_with_label = format!("{}#", NO_PROJECT);
    let mut ids: Vec<String> = Vec::with_capacity(project_ids.len());
    for id in project_ids {
        if id.is_empty() || id == NO_PROJECT || *id == sentinel_with_label {
            continue;
        }
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}

// =============================================================================
// No-op Registry
// =============================================================================

/// Registry used when no projects backend is configured.
#[derive(Debug, Clone, Default)]
pub struct NoOpRegistry;

#[async_trait]
impl ProjectRegistry for NoOpRegistry {
    async fn register(&self, _project: &RemoteProject) -> SyncResult<()> {
        Ok(())
    }

    async fn retire(&self, _project_ids: &[String]) -> SyncResult<()> {
        Ok(())
    }
}

// =============================================================================
// HTTP Registry
// =============================================================================

/// Projects backend reached over HTTP.
///
/// ```text
/// register → POST {base}/new-project                body: project JSON
/// retire   → POST {base}/delete-scheduler-projects  body: {"project_ids": [...]}
/// ```
#[derive(Debug, Clone)]
pub struct HttpProjectRegistry {
    client: reqwest::Client,
    base: Url,
}

impl HttpProjectRegistry {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        HttpProjectRegistry { client, base }
    }

    fn url(&self, path: &str) -> SyncResult<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> SyncResult<()> {
        let url = self.url(path)?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::Registry(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Registry(format!("{} returned HTTP {}", path, status)));
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectRegistry for HttpProjectRegistry {
    async fn register(&self, project: &RemoteProject) -> SyncResult<()> {
        debug!(project = %project.project_id, "Registering imported project");
        let body = serde_json::to_value(project).map_err(|e| SyncError::Registry(e.to_string()))?;
        self.post("new-project", &body).await
    }

    async fn retire(&self, project_ids: &[String]) -> SyncResult<()> {
        let ids = retirable_ids(project_ids);
        if ids.is_empty() {
            return Ok(());
        }
        debug!(count = ids.len(), "Retiring imported projects");
        self.post("delete-scheduler-projects", &json!({ "project_ids": ids }))
            .await
    }
}
