//! The catalog bridge.
//!
//! Resolution never talks to a storage engine directly; it goes through the
//! [`Catalog`] trait. Every call is a synchronous round trip and any failure
//! is fatal to the document or operation that issued it. Nothing here
//! retries.

use chrono::{DateTime, Utc};
use geocat_doc::{document_changes, ChangeRules, ClassifiedChanges, Document};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::{CatalogError, DatasetGraph, DatasetId, Product, ResolvedDataset};

/// A dataset as recorded by the catalog. Read-only to resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: DatasetId,
    pub product: Arc<Product>,
    /// Catalogued metadata, lineage field removed.
    pub metadata: Document,
    /// Active locations, primary first.
    pub locations: Vec<String>,
    /// Lineage classifier to source identity.
    pub sources: BTreeMap<String, DatasetId>,
    pub archived_time: Option<DateTime<Utc>>,
    pub indexed_time: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    pub fn is_archived(&self) -> bool {
        self.archived_time.is_some()
    }

    pub fn local_uri(&self) -> Option<&str> {
        self.locations.first().map(String::as_str)
    }

    pub fn status(&self) -> &'static str {
        if self.is_archived() {
            "archived"
        } else {
            "active"
        }
    }
}

/// Operations resolution, update and archival need from a backing catalog.
pub trait Catalog {
    /// Entries for every identity in `ids` the catalog knows. One round trip.
    fn bulk_get(
        &self,
        ids: &BTreeSet<DatasetId>,
    ) -> Result<HashMap<DatasetId, CatalogEntry>, CatalogError>;

    fn get(&self, id: &DatasetId) -> Result<Option<CatalogEntry>, CatalogError>;

    /// Record the root of `graph`. With `with_lineage`, sources the catalog
    /// does not know yet are recorded first; otherwise they must already exist.
    fn add(&self, graph: &DatasetGraph, with_lineage: bool) -> Result<(), CatalogError>;

    /// Replace the metadata of an indexed dataset and record its location.
    /// Fails with [`CatalogError::Validation`] when `rules` do not allow every change.
    fn update(&self, dataset: &ResolvedDataset, rules: &ChangeRules) -> Result<(), CatalogError>;

    /// How `dataset` differs from its catalogued record under `rules`.
    fn can_update(
        &self,
        dataset: &ResolvedDataset,
        rules: &ChangeRules,
    ) -> Result<ClassifiedChanges, CatalogError> {
        let id = dataset
            .id()
            .ok_or_else(|| CatalogError::Validation("dataset has no identity".to_string()))?;
        let existing = self.get(&id)?.ok_or(CatalogError::NotFound(id))?;
        if existing.product.name != dataset.product().name {
            return Err(CatalogError::Validation(format!(
                "Changing product is not supported: {} -> {}",
                existing.product.name,
                dataset.product().name
            )));
        }
        Ok(rules.classify(document_changes(&existing.metadata, dataset.metadata())))
    }

    fn archive(&self, ids: &[DatasetId]) -> Result<(), CatalogError>;

    fn restore(&self, ids: &[DatasetId]) -> Result<(), CatalogError>;

    /// Mark `uri` archived for `id`. Returns whether the location was active.
    fn archive_location(&self, id: &DatasetId, uri: &str) -> Result<bool, CatalogError>;

    /// Drop `uri` from `id`. Returns whether the location existed.
    fn remove_location(&self, id: &DatasetId, uri: &str) -> Result<bool, CatalogError>;

    /// Datasets that list `id` among their direct sources.
    fn get_derived(&self, id: &DatasetId) -> Result<Vec<CatalogEntry>, CatalogError>;

    fn product_by_name(&self, name: &str) -> Result<Option<Arc<Product>>, CatalogError>;

    fn products(&self) -> Result<Vec<Arc<Product>>, CatalogError>;
}
