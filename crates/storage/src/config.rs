//! Persistence configuration.
//!
//! Decides once, at construction of the facade, whether the remote backend
//! is authoritative. The remote backend is used if and only if a URL and a
//! key are configured and it is enabled.
//!
//! # Example (TOML)
//!
//! ```toml
//! [remote]
//! url = "https://project.example.co"
//! api_key = "anon-key"
//! enabled = true
//!
//! [local]
//! dir = "/var/lib/runledger"
//! ```
//!
//! # Remote schema
//!
//! The backend serves three tables below `rest_path`: `runs`, `artefacts`
//! and `audit_log`. Besides the record fields, `runs` must carry a
//! nullable `updated_at timestamptz` column: every run update writes it and
//! the stuck-run sweep reads it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const ENV_REMOTE_URL: &str = "RUNLEDGER_REMOTE_URL";
pub const ENV_REMOTE_KEY: &str = "RUNLEDGER_REMOTE_KEY";
pub const ENV_REMOTE_ENABLED: &str = "RUNLEDGER_REMOTE_ENABLED";
pub const ENV_LOCAL_DIR: &str = "RUNLEDGER_LOCAL_DIR";

fn default_enabled() -> bool {
    true
}

fn default_rest_path() -> String {
    "/rest/v1".to_string()
}

/// Top-level persistence configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub local: LocalConfig,
}

/// `[remote]` section: the hosted relational backend. See the module docs
/// for the columns it must provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path of the table API below `url`.
    #[serde(default = "default_rest_path")]
    pub rest_path: String,
}

/// `[local]` section: the fallback store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding one JSON file per collection. `None` keeps the
    /// collections in process memory only.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl PersistenceConfig {
    /// Configuration from the process environment alone.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `RUNLEDGER_*` overrides obtained through `lookup`.
    ///
    /// URL and key override the corresponding remote fields; a remote
    /// section is created only when both end up present.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = non_empty(ENV_REMOTE_URL).or_else(|| self.remote.as_ref().map(|r| r.url.clone()));
        let api_key =
            non_empty(ENV_REMOTE_KEY).or_else(|| self.remote.as_ref().map(|r| r.api_key.clone()));
        let enabled = non_empty(ENV_REMOTE_ENABLED)
            .map(|v| parse_flag(&v))
            .or_else(|| self.remote.as_ref().map(|r| r.enabled))
            .unwrap_or(true);
        let rest_path = self
            .remote
            .as_ref()
            .map(|r| r.rest_path.clone())
            .unwrap_or_else(default_rest_path);

        self.remote = match (url, api_key) {
            (Some(url), Some(api_key)) => Some(RemoteConfig {
                url,
                api_key,
                enabled,
                rest_path,
            }),
            _ => None,
        };

        if let Some(dir) = non_empty(ENV_LOCAL_DIR) {
            self.local.dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// The remote section, if it makes the remote backend authoritative.
    pub fn authoritative_remote(&self) -> Option<&RemoteConfig> {
        self.remote
            .as_ref()
            .filter(|r| r.enabled && !r.url.trim().is_empty() && !r.api_key.trim().is_empty())
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
