//! In-memory catalog and fixtures for unit tests.

use chrono::Utc;
use geocat_doc::{ChangeRules, Document};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{Catalog, CatalogEntry, CatalogError, DatasetGraph, DatasetId, Product, ResolvedDataset};

pub fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

/// Deterministic identity for fixtures.
pub fn uuid(n: u128) -> DatasetId {
    DatasetId::from_u128(0x6765_6f63_6174_0000_0000_0000_0000_0000 | n)
}

pub fn entry(id: DatasetId, product: &Arc<Product>, metadata: Value) -> CatalogEntry {
    CatalogEntry {
        id,
        product: Arc::clone(product),
        metadata: doc(metadata),
        locations: Vec::new(),
        sources: BTreeMap::new(),
        archived_time: None,
        indexed_time: Some(Utc::now()),
    }
}

#[derive(Default)]
pub struct StubCatalog {
    products: RwLock<Vec<Arc<Product>>>,
    entries: RwLock<HashMap<DatasetId, CatalogEntry>>,
    bulk_get_calls: AtomicUsize,
    get_derived_calls: AtomicUsize,
}

impl StubCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, product: Product) -> Arc<Product> {
        let product = Arc::new(product);
        self.products.write().push(Arc::clone(&product));
        product
    }

    pub fn insert_entry(&self, entry: CatalogEntry) {
        self.entries.write().insert(entry.id, entry);
    }

    pub fn entry(&self, id: &DatasetId) -> Option<CatalogEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn bulk_get_calls(&self) -> usize {
        self.bulk_get_calls.load(Ordering::SeqCst)
    }

    pub fn get_derived_calls(&self) -> usize {
        self.get_derived_calls.load(Ordering::SeqCst)
    }

    fn with_entry<T>(
        &self,
        id: &DatasetId,
        f: impl FnOnce(&mut CatalogEntry) -> T,
    ) -> Result<T, CatalogError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or(CatalogError::NotFound(*id))?;
        Ok(f(entry))
    }
}

fn record(graph: &DatasetGraph, node: crate::NodeId, id: DatasetId) -> CatalogEntry {
    let ds = graph.node(node);
    CatalogEntry {
        id,
        product: Arc::clone(ds.product()),
        metadata: ds.metadata().clone(),
        locations: ds.uris().to_vec(),
        sources: graph.source_ids(node).into_iter().collect(),
        archived_time: None,
        indexed_time: Some(Utc::now()),
    }
}

impl Catalog for StubCatalog {
    fn bulk_get(
        &self,
        ids: &BTreeSet<DatasetId>,
    ) -> Result<HashMap<DatasetId, CatalogEntry>, CatalogError> {
        self.bulk_get_calls.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.read();
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id).map(|e| (*id, e.clone())))
            .collect())
    }

    fn get(&self, id: &DatasetId) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn add(&self, graph: &DatasetGraph, with_lineage: bool) -> Result<(), CatalogError> {
        let root = graph.root_node();
        let root_id = graph
            .root()
            .id()
            .ok_or_else(|| CatalogError::Validation("dataset has no identity".to_string()))?;
        let mut entries = self.entries.write();
        if entries.contains_key(&root_id) {
            return Err(CatalogError::Duplicate(root_id));
        }
        for node in graph.bottom_up().filter(|n| *n != root) {
            let Some(id) = graph.node(node).id() else {
                continue;
            };
            if entries.contains_key(&id) {
                continue;
            }
            if !with_lineage {
                return Err(CatalogError::Validation(format!("source {id} is not indexed")));
            }
            entries.insert(id, record(graph, node, id));
        }
        entries.insert(root_id, record(graph, root, root_id));
        Ok(())
    }

    fn update(&self, dataset: &ResolvedDataset, rules: &ChangeRules) -> Result<(), CatalogError> {
        let changes = self.can_update(dataset, rules)?;
        if !changes.is_safe() {
            return Err(CatalogError::Validation(format!(
                "{} unsafe changes",
                changes.unsafe_changes.len()
            )));
        }
        let id = dataset.id().ok_or_else(|| CatalogError::Validation("no id".to_string()))?;
        self.with_entry(&id, |entry| {
            entry.metadata = dataset.metadata().clone();
            for uri in dataset.uris() {
                if !entry.locations.contains(uri) {
                    entry.locations.push(uri.clone());
                }
            }
        })
    }

    fn archive(&self, ids: &[DatasetId]) -> Result<(), CatalogError> {
        let now = Utc::now();
        for id in ids {
            self.with_entry(id, |e| e.archived_time = Some(now))?;
        }
        Ok(())
    }

    fn restore(&self, ids: &[DatasetId]) -> Result<(), CatalogError> {
        for id in ids {
            self.with_entry(id, |e| e.archived_time = None)?;
        }
        Ok(())
    }

    fn archive_location(&self, id: &DatasetId, uri: &str) -> Result<bool, CatalogError> {
        self.remove_location(id, uri)
    }

    fn remove_location(&self, id: &DatasetId, uri: &str) -> Result<bool, CatalogError> {
        self.with_entry(id, |e| {
            let before = e.locations.len();
            e.locations.retain(|l| l != uri);
            e.locations.len() != before
        })
    }

    fn get_derived(&self, id: &DatasetId) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.get_derived_calls.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.read();
        let mut derived: Vec<CatalogEntry> = entries
            .values()
            .filter(|e| e.sources.values().any(|s| s == id))
            .cloned()
            .collect();
        derived.sort_by_key(|e| e.id);
        Ok(derived)
    }

    fn product_by_name(&self, name: &str) -> Result<Option<Arc<Product>>, CatalogError> {
        Ok(self.products.read().iter().find(|p| p.name == name).cloned())
    }

    fn products(&self) -> Result<Vec<Arc<Product>>, CatalogError> {
        Ok(self.products.read().clone())
    }
}
