//! Printable dataset records.

use chrono::{DateTime, Utc};
use geocat_doc::Document;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::{Catalog, CatalogEntry, CatalogError, DatasetId};

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub id: DatasetId,
    pub product: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<DateTime<Utc>>,
    pub locations: Vec<String>,
    pub fields: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeMap<String, DatasetInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived: Option<Vec<DatasetInfo>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoOptions {
    pub show_sources: bool,
    pub show_derived: bool,
    /// Levels of sources/derived to follow, counting the dataset itself.
    pub max_depth: usize,
}

impl Default for InfoOptions {
    fn default() -> Self {
        Self {
            show_sources: false,
            show_derived: false,
            max_depth: 99,
        }
    }
}

/// Describe `entry`, following its sources and/or derived datasets.
///
/// Sources are followed upward only and derived datasets downward only, so
/// the walk cannot bounce back and forth between the two.
pub fn dataset_info<C: Catalog + ?Sized>(
    catalog: &C,
    entry: &CatalogEntry,
    options: &InfoOptions,
) -> Result<DatasetInfo, CatalogError> {
    build(catalog, entry, options.show_sources, options.show_derived, 1, options.max_depth)
}

fn build<C: Catalog + ?Sized>(
    catalog: &C,
    entry: &CatalogEntry,
    show_sources: bool,
    show_derived: bool,
    depth: usize,
    max_depth: usize,
) -> Result<DatasetInfo, CatalogError> {
    let mut info = DatasetInfo {
        id: entry.id,
        product: entry.product.name.clone(),
        status: entry.status(),
        indexed: entry.indexed_time,
        locations: entry.locations.clone(),
        fields: entry.metadata.clone(),
        sources: None,
        derived: None,
    };

    if depth >= max_depth {
        return Ok(info);
    }

    if show_sources {
        let mut sources = BTreeMap::new();
        for (classifier, id) in &entry.sources {
            match catalog.get(id)? {
                Some(source) => {
                    sources.insert(
                        classifier.clone(),
                        build(catalog, &source, true, false, depth + 1, max_depth)?,
                    );
                }
                None => tracing::warn!(id = %id, classifier = %classifier, "source dataset not indexed"),
            }
        }
        info.sources = Some(sources);
    }

    if show_derived {
        let derived = catalog
            .get_derived(&entry.id)?
            .iter()
            .map(|d| build(catalog, d, false, true, depth + 1, max_depth))
            .collect::<Result<Vec<_>, _>>()?;
        info.derived = Some(derived);
    }

    Ok(info)
}
