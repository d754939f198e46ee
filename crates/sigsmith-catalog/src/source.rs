//! The catalog source collaborator: fetch the upstream STIX bundle with an
//! on-disk cache and an explicit freshness policy.
//!
//! The cache file is reused while fresh, so re-fetching unchanged upstream
//! data yields byte-identical records and revision bumps only reflect real
//! upstream changes. Downloads are written to a sibling temp file and
//! renamed into place so a failed fetch never clobbers a good cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::{CatalogError, Result};
use crate::model::Technique;
use crate::stix::parse_bundle_file;

/// The ATT&CK Enterprise bundle published by MITRE.
pub const DEFAULT_BUNDLE_URL: &str =
    "https://raw.githubusercontent.com/mitre/cti/master/enterprise-attack/enterprise-attack.json";

/// How stale a cached bundle may be before it is re-downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessPolicy {
    /// Never download; the cache must already exist.
    CacheOnly,
    /// Reuse the cache if its mtime is within the given age, else download.
    MaxAge(Duration),
    /// Always download.
    Refresh,
}

/// Fetches raw technique records from the upstream catalog.
pub struct CatalogSource {
    url: String,
    cache_path: PathBuf,
    policy: FreshnessPolicy,
}

impl CatalogSource {
    pub fn new(
        url: impl Into<String>,
        cache_path: impl Into<PathBuf>,
        policy: FreshnessPolicy,
    ) -> Self {
        CatalogSource {
            url: url.into(),
            cache_path: cache_path.into(),
            policy,
        }
    }

    /// Fetch the catalog per the freshness policy and parse it into
    /// techniques. Network errors, cache misses under `CacheOnly`, and
    /// bundle-shape problems all surface as [`CatalogError`]; nothing is
    /// retried here.
    pub fn fetch(&self) -> Result<Vec<Technique>> {
        if !self.cache_is_fresh() {
            if self.policy == FreshnessPolicy::CacheOnly {
                return Err(CatalogError::MissingCache(self.cache_path.clone()));
            }
            self.download()?;
        }
        parse_bundle_file(&self.cache_path)
    }

    fn cache_is_fresh(&self) -> bool {
        match self.policy {
            FreshnessPolicy::Refresh => false,
            FreshnessPolicy::CacheOnly => self.cache_path.exists(),
            FreshnessPolicy::MaxAge(max_age) => cache_age(&self.cache_path)
                .map(|age| age <= max_age)
                .unwrap_or(false),
        }
    }

    fn download(&self) -> Result<()> {
        info!(url = %self.url, "downloading catalog bundle");
        let body = reqwest::blocking::get(&self.url)?
            .error_for_status()?
            .text()?;

        if let Some(dir) = self.cache_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.cache_path.with_extension("download");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.cache_path)?;
        info!(path = %self.cache_path.display(), "catalog cache updated");
        Ok(())
    }
}

fn cache_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified.elapsed().ok()
}
