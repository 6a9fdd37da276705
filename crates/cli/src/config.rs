//! CLI configuration: an optional TOML file, then environment overrides.
//!
//! ```toml
//! [remote]
//! url = "https://project.example.co"
//! api_key = "anon-key"
//!
//! [local]
//! dir = "./.runledger"
//!
//! [generation]
//! model = "claude-sonnet-4-20250514"
//! ```

use std::path::Path;

use runledger_storage::PersistenceConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CliConfig {
    #[serde(flatten)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// `[generation]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GenerationConfig {
    /// Model used for approved runs. `RUNLEDGER_MODEL` takes precedence.
    #[serde(default)]
    pub model: Option<String>,
}

/// Read `path` when given and apply `RUNLEDGER_*` environment overrides.
pub(crate) fn load(path: Option<&Path>) -> Result<CliConfig, String> {
    let config = match path {
        Some(path) => read_config(path)?,
        None => CliConfig::default(),
    };
    Ok(with_env(config, |key| std::env::var(key).ok()))
}

fn read_config(path: &Path) -> Result<CliConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

fn with_env(config: CliConfig, lookup: impl Fn(&str) -> Option<String>) -> CliConfig {
    CliConfig {
        persistence: config.persistence.with_overrides(lookup),
        generation: config.generation,
    }
}
