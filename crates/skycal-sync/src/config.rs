//! # Sync Configuration
//!
//! Configuration management for the sync engine and daemon.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SKYCAL_DATABASE_PATH=/var/lib/skycal/skycal.db                     │
//! │     SKYCAL_SYNC_INTERVAL_SECS=300                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/skycal/skycal.toml (Linux)                               │
//! │     ~/Library/Application Support/org.skycal.skycal/skycal.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Five sub-resources across the mrc / aro / eco proxies              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # skycal.toml
//! [database]
//! path = "/var/lib/skycal/skycal.db"
//!
//! [sync]
//! interval_secs = 300
//! fetch_timeout_secs = 30
//! horizon_days = 21
//!
//! [remote]
//! label = "LCO"
//! url_template = "https://{site}-proxy.lco.global"
//!
//! [projects]
//! url = "https://projects.example.org"
//!
//! [[subresources]]
//! id = "mrc1"
//! remote_site = "mrc"
//! telescope = "0m31"
//! ```
//!
//! The sub-resource table is the only source of the site map: the
//! translator receives an immutable [`SiteMap`] built from it.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use skycal_core::{SiteMap, DEFAULT_REMOTE_LABEL};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the reservation store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("org", "skycal", "skycal")
        .map(|dirs| dirs.data_dir().join("skycal.db"))
        .unwrap_or_else(|| PathBuf::from("skycal.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync pass behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between periodic `run_sync_all` invocations (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Upper bound for one sub-resource's fetch, retries included (seconds).
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// How far past "now" the schedule window reaches (days).
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    /// Page size requested from the schedule endpoint.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Initial backoff duration (milliseconds) between fetch retries.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) between fetch retries.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_interval() -> u64 {
    300
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_horizon_days() -> u32 {
    21
}
fn default_page_limit() -> u32 {
    1000
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    10
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            horizon_days: default_horizon_days(),
            page_limit: default_page_limit(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Remote Scheduler Settings
// =============================================================================

/// How the remote scheduler's site proxies are addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Label used in imported owner ids and titles.
    #[serde(default = "default_label")]
    pub label: String,

    /// Base URL of a remote site's proxy; `{site}` is replaced by the
    /// remote site code.
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

fn default_label() -> String {
    DEFAULT_REMOTE_LABEL.to_string()
}

fn default_url_template() -> String {
    "https://{site}-proxy.lco.global".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            label: default_label(),
            url_template: default_url_template(),
        }
    }
}

/// Projects backend. Without a URL, project registration is disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectsSettings {
    #[serde(default)]
    pub url: Option<String>,
}

// =============================================================================
// Sub-resources
// =============================================================================

/// One synchronizable unit: a local site fed by one remote telescope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubresourceConfig {
    /// Local site identifier (e.g. "mrc1").
    pub id: String,

    /// Remote site / proxy code (e.g. "mrc").
    pub remote_site: String,

    /// Remote telescope id (e.g. "0m31").
    pub telescope: String,

    /// Overrides the templated proxy URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the proxy secret.
    /// Defaults to `SKYCAL_{REMOTE_SITE}_TOKEN`.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl SubresourceConfig {
    pub fn new(
        id: impl Into<String>,
        remote_site: impl Into<String>,
        telescope: impl Into<String>,
    ) -> Self {
        SubresourceConfig {
            id: id.into(),
            remote_site: remote_site.into(),
            telescope: telescope.into(),
            base_url: None,
            token_env: None,
        }
    }

    /// Name of the environment variable holding this sub-resource's secret.
    pub fn token_var(&self) -> String {
        self.token_env.clone().unwrap_or_else(|| {
            format!("SKYCAL_{}_TOKEN", self.remote_site.to_uppercase())
        })
    }
}

fn default_subresources() -> Vec<SubresourceConfig> {
    vec![
        SubresourceConfig::new("mrc1", "mrc", "0m31"),
        SubresourceConfig::new("mrc2", "mrc", "0m61"),
        SubresourceConfig::new("aro1", "aro", "0m3"),
        SubresourceConfig::new("eco1", "eco", "0m43"),
        SubresourceConfig::new("eco2", "eco", "0m28"),
    ]
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub projects: ProjectsSettings,

    #[serde(default = "default_subresources")]
    pub subresources: Vec<SubresourceConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            database: DatabaseSettings::default(),
            sync: SyncSettings::default(),
            remote: RemoteSettings::default(),
            projects: ProjectsSettings::default(),
            subresources: default_subresources(),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (skycal.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }
        if self.sync.fetch_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "fetch_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.sync.horizon_days == 0 || self.sync.page_limit == 0 {
            return Err(SyncError::InvalidConfig(
                "horizon_days and page_limit must be greater than 0".into(),
            ));
        }
        if self.remote.label.trim().is_empty() {
            return Err(SyncError::InvalidConfig("remote label is empty".into()));
        }

        let mut ids = HashSet::new();
        let mut pairs = HashSet::new();
        for sub in &self.subresources {
            if sub.id.trim().is_empty()
                || sub.remote_site.trim().is_empty()
                || sub.telescope.trim().is_empty()
            {
                return Err(SyncError::InvalidConfig(format!(
                    "sub-resource entries need id, remote_site and telescope: {:?}",
                    sub
                )));
            }
            if !ids.insert(sub.id.as_str()) {
                return Err(SyncError::InvalidConfig(format!(
                    "duplicate sub-resource id '{}'",
                    sub.id
                )));
            }
            if !pairs.insert((sub.remote_site.as_str(), sub.telescope.as_str())) {
                return Err(SyncError::InvalidConfig(format!(
                    "remote site '{}' telescope '{}' is mapped twice",
                    sub.remote_site, sub.telescope
                )));
            }
            if sub.base_url.is_none() && !self.remote.url_template.contains("{site}") {
                return Err(SyncError::InvalidConfig(format!(
                    "url_template has no {{site}} placeholder and '{}' has no base_url",
                    sub.id
                )));
            }
            self.endpoint(sub)?;
        }

        if let Some(ref url) = self.projects.url {
            Url::parse(url)?;
        }

        Ok(())
    }

    /// Applies `SKYCAL_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("SKYCAL_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(secs) = lookup("SKYCAL_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid SKYCAL_SYNC_INTERVAL_SECS"),
            }
        }

        if let Some(secs) = lookup("SKYCAL_FETCH_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.fetch_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid SKYCAL_FETCH_TIMEOUT_SECS"),
            }
        }

        if let Some(template) = lookup("SKYCAL_REMOTE_URL_TEMPLATE") {
            debug!(template = %template, "Overriding remote URL template from environment");
            self.remote.url_template = template;
        }

        if let Some(url) = lookup("SKYCAL_PROJECTS_URL") {
            self.projects.url = if url.is_empty() { None } else { Some(url) };
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "skycal", "skycal")
            .map(|dirs| dirs.config_dir().join("skycal.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Builds the immutable site map handed to the translator.
    pub fn site_map(&self) -> SiteMap {
        self.subresources.iter().fold(SiteMap::new(), |map, sub| {
            map.with(&sub.remote_site, &sub.telescope, &sub.id)
        })
    }

    pub fn subresource(&self, id: &str) -> Option<&SubresourceConfig> {
        self.subresources.iter().find(|s| s.id == id)
    }

    pub fn subresource_ids(&self) -> Vec<String> {
        self.subresources.iter().map(|s| s.id.clone()).collect()
    }

    /// Proxy base URL for a sub-resource, without a trailing slash.
    pub fn endpoint(&self, sub: &SubresourceConfig) -> SyncResult<Url> {
        let raw = match sub.base_url {
            Some(ref base) => base.clone(),
            None => self.remote.url_template.replace("{site}", &sub.remote_site),
        };
        Ok(Url::parse(raw.trim_end_matches('/'))?)
    }

    /// Proxy secret for a sub-resource, read from its environment variable.
    pub fn token(&self, sub: &SubresourceConfig) -> Option<String> {
        std::env::var(sub.token_var()).ok().filter(|t| !t.is_empty())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.fetch_timeout_secs)
    }

    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.sync.horizon_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.horizon_days, 21);
        assert_eq!(config.sync.page_limit, 1000);
        assert_eq!(config.subresources.len(), 5);

        let sites = config.site_map();
        assert_eq!(sites.resolve("mrc", "0m31"), Some("mrc1"));
        assert_eq!(sites.resolve("eco", "0m28"), Some("eco2"));
        assert_eq!(sites.resolve("mrc", "1m0"), None);
    }

    #[test]
    fn test_endpoint_and_token_var() {
        let config = SyncConfig::default();
        let mrc1 = config.subresource("mrc1").unwrap();
        assert_eq!(
            config.endpoint(mrc1).unwrap().as_str(),
            "https://mrc-proxy.lco.global/"
        );
        assert_eq!(mrc1.token_var(), "SKYCAL_MRC_TOKEN");

        let mut custom = mrc1.clone();
        custom.base_url = Some("http://127.0.0.1:9000/".into());
        custom.token_env = Some("MRC_SECRET".into());
        assert_eq!(
            config.endpoint(&custom).unwrap().as_str(),
            "http://127.0.0.1:9000/"
        );
        assert_eq!(custom.token_var(), "MRC_SECRET");
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        config.sync.interval_secs = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        let mut config = SyncConfig::default();
        config.subresources.push(SubresourceConfig::new("mrc1", "mrc", "0m40"));
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.subresources.push(SubresourceConfig::new("mrc3", "mrc", "0m31"));
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.projects.url = Some("not a url".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SKYCAL_DATABASE_PATH", "/tmp/skycal-test.db"),
            ("SKYCAL_SYNC_INTERVAL_SECS", "60"),
            ("SKYCAL_FETCH_TIMEOUT_SECS", "soon"),
            ("SKYCAL_PROJECTS_URL", "https://projects.example.org"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/skycal-test.db"));
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.fetch_timeout_secs, 30);
        assert_eq!(
            config.projects.url.as_deref(),
            Some("https://projects.example.org")
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
            [sync]
            interval_secs = 120

            [[subresources]]
            id = "saf"
            remote_site = "saf"
            telescope = "0m4"
            base_url = "http://localhost:8080"
        "#;
        let config: SyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sync.interval_secs, 120);
        assert_eq!(config.sync.fetch_timeout_secs, 30);
        assert_eq!(config.subresource_ids(), vec!["saf".to_string()]);
        assert!(config.validate().is_ok());

        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[[subresources]]"));
    }
}
