//! Geocat catalog storage
//!
//! A complete [`Catalog`] kept in memory and persisted as a JSON snapshot:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      MemoryCatalog                         │
//! ├────────────────────────────────────────────────────────────┤
//! │  products   name ──► Product                               │
//! │  datasets   id ──► StoredDataset (metadata, locations,     │
//! │                    sources, archive/index times)           │
//! │  derived    source id ──► ids that list it as a source     │
//! └──────────────────────────┬─────────────────────────────────┘
//!                            │ save / open
//!                            ▼
//!                  catalog.json (snapshot)
//! ```
//!
//! Every mutation validates before it writes, so a failed call leaves the
//! catalog unchanged.

pub mod persistence;


use anyhow::anyhow;
use chrono::Utc;
use geocat_core::{
    Catalog, CatalogEntry, CatalogError, DatasetGraph, DatasetId, NodeId, Product, ResolvedDataset,
};
use geocat_doc::{document_changes, render_differences, ChangeRules};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

pub use persistence::{Snapshot, StoredDataset, SNAPSHOT_VERSION};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot file
    pub catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("./geocat-catalog.json"),
        }
    }
}

// ============================================================================
// Catalog state
// ============================================================================

#[derive(Debug, Default)]
struct State {
    /// Registration order is kept for listing.
    products: Vec<Arc<Product>>,
    datasets: HashMap<DatasetId, StoredDataset>,
    /// Reverse lineage: source id to the ids derived from it.
    derived: HashMap<DatasetId, BTreeSet<DatasetId>>,
}

impl State {
    fn product(&self, name: &str) -> Option<&Arc<Product>> {
        self.products.iter().find(|p| p.name == name)
    }

    fn entry(&self, stored: &StoredDataset) -> Result<CatalogEntry, CatalogError> {
        let product = self.product(&stored.product).ok_or_else(|| {
            CatalogError::Other(anyhow!(
                "dataset {} refers to unregistered product {}",
                stored.id,
                stored.product
            ))
        })?;
        Ok(CatalogEntry {
            id: stored.id,
            product: Arc::clone(product),
            metadata: stored.metadata.clone(),
            locations: stored.locations.clone(),
            sources: stored.sources.clone(),
            archived_time: stored.archived_time,
            indexed_time: stored.indexed_time,
        })
    }

    fn insert(&mut self, stored: StoredDataset) {
        for source in stored.sources.values() {
            self.derived.entry(*source).or_default().insert(stored.id);
        }
        self.datasets.insert(stored.id, stored);
    }

    fn stored_mut(&mut self, id: &DatasetId) -> Result<&mut StoredDataset, CatalogError> {
        self.datasets.get_mut(id).ok_or(CatalogError::NotFound(*id))
    }
}

// ============================================================================
// MemoryCatalog
// ============================================================================

pub struct MemoryCatalog {
    config: StorageConfig,
    state: Arc<RwLock<State>>,
}

impl MemoryCatalog {
    /// Empty catalog that saves to `config.catalog_path`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Load the snapshot at `config.catalog_path`, or start empty if there is none.
    pub fn open(config: StorageConfig) -> anyhow::Result<Self> {
        let catalog = Self::new(config);
        if catalog.config.catalog_path.exists() {
            let snapshot = Snapshot::load(&catalog.config.catalog_path)?;
            catalog.restore_snapshot(snapshot)?;
            tracing::debug!(
                path = %catalog.config.catalog_path.display(),
                datasets = catalog.len(),
                "opened catalog"
            );
        }
        Ok(catalog)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Write the snapshot to `config.catalog_path`.
    pub fn save(&self) -> anyhow::Result<()> {
        self.snapshot().save(&self.config.catalog_path)?;
        tracing::debug!(path = %self.config.catalog_path.display(), "saved catalog");
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        let mut datasets: Vec<StoredDataset> = state.datasets.values().cloned().collect();
        datasets.sort_by_key(|d| d.id);
        Snapshot {
            version: SNAPSHOT_VERSION,
            products: state.products.iter().map(|p| Product::clone(p)).collect(),
            datasets,
        }
    }

    fn restore_snapshot(&self, snapshot: Snapshot) -> anyhow::Result<()> {
        let mut state = State::default();
        for product in snapshot.products {
            state.products.push(Arc::new(product));
        }
        for dataset in snapshot.datasets {
            if state.product(&dataset.product).is_none() {
                anyhow::bail!(
                    "dataset {} refers to unregistered product {}",
                    dataset.id,
                    dataset.product
                );
            }
            state.insert(dataset);
        }
        *self.state.write() = state;
        Ok(())
    }

    /// Register `product`. Re-adding an identical product is a no-op; a
    /// different definition under an existing name is rejected.
    pub fn add_product(&self, product: Product) -> Result<Arc<Product>, CatalogError> {
        let mut state = self.state.write();
        if let Some(existing) = state.product(&product.name) {
            if **existing == product {
                return Ok(Arc::clone(existing));
            }
            let differences = document_changes(&existing.metadata, &product.metadata);
            return Err(CatalogError::Validation(format!(
                "product {} already exists with a different definition: {}",
                product.name,
                render_differences(&differences)
            )));
        }
        tracing::info!(product = %product.name, "added product");
        let product = Arc::new(product);
        state.products.push(Arc::clone(&product));
        Ok(product)
    }

    pub fn len(&self) -> usize {
        self.state.read().datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().datasets.is_empty()
    }

    /// Locations that were archived rather than removed.
    pub fn archived_locations(&self, id: &DatasetId) -> Vec<String> {
        self.state
            .read()
            .datasets
            .get(id)
            .map(|d| d.archived_locations.clone())
            .unwrap_or_default()
    }

    fn stored(graph: &DatasetGraph, node: NodeId, id: DatasetId) -> StoredDataset {
        let ds = graph.node(node);
        StoredDataset {
            id,
            product: ds.product().name.clone(),
            metadata: ds.metadata().clone(),
            locations: ds.uris().to_vec(),
            archived_locations: Vec::new(),
            sources: graph.source_ids(node).into_iter().collect(),
            archived_time: None,
            indexed_time: Some(Utc::now()),
        }
    }
}

fn require_id(dataset: &ResolvedDataset) -> Result<DatasetId, CatalogError> {
    dataset
        .id()
        .ok_or_else(|| CatalogError::Validation("dataset has no identity".to_string()))
}

impl Catalog for MemoryCatalog {
    fn bulk_get(
        &self,
        ids: &BTreeSet<DatasetId>,
    ) -> Result<HashMap<DatasetId, CatalogEntry>, CatalogError> {
        let state = self.state.read();
        ids.iter()
            .filter_map(|id| state.datasets.get(id))
            .map(|stored| Ok((stored.id, state.entry(stored)?)))
            .collect()
    }

    fn get(&self, id: &DatasetId) -> Result<Option<CatalogEntry>, CatalogError> {
        let state = self.state.read();
        state.datasets.get(id).map(|d| state.entry(d)).transpose()
    }

    fn add(&self, graph: &DatasetGraph, with_lineage: bool) -> Result<(), CatalogError> {
        let root = graph.root_node();
        let root_id = require_id(graph.root())?;

        let mut state = self.state.write();
        if state.datasets.contains_key(&root_id) {
            return Err(CatalogError::Duplicate(root_id));
        }

        let mut pending = Vec::new();
        for node in graph.bottom_up() {
            let dataset = graph.node(node);
            let Some(id) = dataset.id() else {
                return Err(CatalogError::Validation(format!(
                    "source dataset of {root_id} has no identity"
                )));
            };
            if node != root && state.datasets.contains_key(&id) {
                continue;
            }
            if node != root && !with_lineage {
                return Err(CatalogError::Validation(format!(
                    "source dataset {id} is not indexed"
                )));
            }
            let product = &dataset.product().name;
            if state.product(product).is_none() {
                return Err(CatalogError::UnknownProduct(product.clone()));
            }
            pending.push(Self::stored(graph, node, id));
        }

        for stored in pending {
            tracing::debug!(id = %stored.id, product = %stored.product, "indexing dataset");
            state.insert(stored);
        }
        Ok(())
    }

    fn update(&self, dataset: &ResolvedDataset, rules: &ChangeRules) -> Result<(), CatalogError> {
        let changes = self.can_update(dataset, rules)?;
        if !changes.is_safe() {
            return Err(CatalogError::Validation(format!(
                "Updating the dataset {} is not allowed: {}",
                dataset.label(),
                render_differences(&changes.unsafe_changes)
            )));
        }

        let id = require_id(dataset)?;
        let mut state = self.state.write();
        let stored = state.stored_mut(&id)?;
        stored.metadata = dataset.metadata().clone();
        for uri in dataset.uris() {
            if !stored.locations.contains(uri) {
                stored.locations.push(uri.clone());
            }
            stored.archived_locations.retain(|l| l != uri);
        }
        tracing::debug!(id = %id, safe_changes = changes.safe_changes.len(), "updated dataset");
        Ok(())
    }

    fn archive(&self, ids: &[DatasetId]) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        if let Some(missing) = ids.iter().find(|id| !state.datasets.contains_key(*id)) {
            return Err(CatalogError::NotFound(*missing));
        }
        let now = Utc::now();
        for id in ids {
            let stored = state.stored_mut(id)?;
            stored.archived_time.get_or_insert(now);
        }
        Ok(())
    }

    fn restore(&self, ids: &[DatasetId]) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        if let Some(missing) = ids.iter().find(|id| !state.datasets.contains_key(*id)) {
            return Err(CatalogError::NotFound(*missing));
        }
        for id in ids {
            state.stored_mut(id)?.archived_time = None;
        }
        Ok(())
    }

    fn archive_location(&self, id: &DatasetId, uri: &str) -> Result<bool, CatalogError> {
        let mut state = self.state.write();
        let stored = state.stored_mut(id)?;
        let before = stored.locations.len();
        stored.locations.retain(|l| l != uri);
        let archived = stored.locations.len() != before;
        if archived {
            stored.archived_locations.push(uri.to_string());
        }
        Ok(archived)
    }

    fn remove_location(&self, id: &DatasetId, uri: &str) -> Result<bool, CatalogError> {
        let mut state = self.state.write();
        let stored = state.stored_mut(id)?;
        let before = stored.locations.len() + stored.archived_locations.len();
        stored.locations.retain(|l| l != uri);
        stored.archived_locations.retain(|l| l != uri);
        Ok(stored.locations.len() + stored.archived_locations.len() != before)
    }

    fn get_derived(&self, id: &DatasetId) -> Result<Vec<CatalogEntry>, CatalogError> {
        let state = self.state.read();
        let Some(derived) = state.derived.get(id) else {
            return Ok(Vec::new());
        };
        derived
            .iter()
            .filter_map(|d| state.datasets.get(d))
            .map(|stored| state.entry(stored))
            .collect()
    }

    fn product_by_name(&self, name: &str) -> Result<Option<Arc<Product>>, CatalogError> {
        Ok(self.state.read().product(name).cloned())
    }

    fn products(&self) -> Result<Vec<Arc<Product>>, CatalogError> {
        Ok(self.state.read().products.clone())
    }
}
