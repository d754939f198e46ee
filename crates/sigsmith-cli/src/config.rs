//! Process configuration: loaded once at startup and passed explicitly into
//! the collaborators that need it. No ambient global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use sigsmith_catalog::{FreshnessPolicy, DEFAULT_BUNDLE_URL};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// YAML configuration file. Every field has a default, so an empty file and
/// a missing file behave identically.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite database location.
    pub db_path: PathBuf,
    /// Upstream STIX bundle URL.
    pub bundle_url: String,
    /// On-disk cache for the downloaded bundle.
    pub cache_path: PathBuf,
    /// Cache age (hours) before `update` re-downloads.
    pub cache_max_age_hours: u64,
    /// Default directory for `export`.
    pub output_dir: PathBuf,
    /// Sub-technique inheritance policy for conversion.
    pub inherit_parent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("sigsmith.db"),
            bundle_url: DEFAULT_BUNDLE_URL.to_string(),
            cache_path: PathBuf::from("enterprise-attack.json"),
            cache_max_age_hours: 24,
            output_dir: PathBuf::from("signatures"),
            inherit_parent: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The freshness policy for a catalog fetch: `--refresh` forces a
    /// download, otherwise the cache is honored up to the configured age.
    pub fn freshness(&self, refresh: bool) -> FreshnessPolicy {
        if refresh {
            FreshnessPolicy::Refresh
        } else {
            FreshnessPolicy::MaxAge(Duration::from_secs(self.cache_max_age_hours * 3600))
        }
    }
}
