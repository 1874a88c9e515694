//! Resolution settings.

use anyhow::Context;
use geocat_doc::DocLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by every resolution against one catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Where documents keep their identity, lineage and measurements
    pub layout: DocLayout,
    /// Signature matching
    pub matching: MatchConfig,
    /// Cascading restore
    pub restore: RestoreConfig,
}

impl CatalogConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .restore
            .tolerance()
            .with_context(|| format!("invalid restore settings in {}", path.display()))?;
        Ok(config)
    }
}

/// Signature matching settings.
///
/// Matching is case-sensitive by default: a signature value matches only an
/// equal document value. Set `case_sensitive` to `false` to compare string
/// scalars ignoring case, as older catalogs did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// When false, string scalars in signatures compare case-insensitively.
    pub case_sensitive: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Derived datasets are restored only when archived within this many
    /// seconds of the target.
    pub derived_tolerance_secs: i64,
}

impl RestoreConfig {
    /// The tolerance window. Negative values and values beyond what a
    /// `chrono::Duration` can hold are rejected.
    pub fn tolerance(&self) -> anyhow::Result<chrono::Duration> {
        let secs = self.derived_tolerance_secs;
        if secs < 0 {
            anyhow::bail!("derived tolerance must not be negative, got {secs} seconds");
        }
        chrono::Duration::try_seconds(secs)
            .ok_or_else(|| anyhow::anyhow!("derived tolerance of {secs} seconds is out of range"))
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            derived_tolerance_secs: 600,
        }
    }
}
