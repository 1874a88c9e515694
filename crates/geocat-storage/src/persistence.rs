//! JSON snapshots of a catalog.
//!
//! The whole catalog is written as one document. Saving goes through a
//! temporary file in the same directory followed by a rename, so a crash
//! mid-write leaves the previous snapshot intact.

use anyhow::Context;
use chrono::{DateTime, Utc};
use geocat_core::{DatasetId, Product};
use geocat_doc::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SNAPSHOT_VERSION: u32 = 1;

/// A dataset as stored. Products are referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDataset {
    pub id: DatasetId,
    pub product: String,
    pub metadata: Document,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archived_locations: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, DatasetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub products: Vec<Product>,
    pub datasets: Vec<StoredDataset>,
}

impl Snapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("parsing catalog snapshot {}", path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "unsupported catalog snapshot version {} in {}",
                snapshot.version,
                path.display()
            );
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("replacing catalog snapshot {}", path.display()))?;
        Ok(())
    }
}
