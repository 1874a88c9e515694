//! Resolved datasets.
//!
//! A resolution produces a [`DatasetGraph`]: an arena of [`ResolvedDataset`]
//! nodes whose lineage maps hold [`NodeId`]s into the same arena. Nodes are
//! pushed bottom-up, so every id a node refers to is smaller than its own;
//! an ancestor shared by several datasets is one node referenced from each.

use geocat_doc::{DocLayout, Document};
use serde::Serialize;
use std::sync::Arc;

use crate::{DatasetId, MeasurementMismatch, Product};

/// Index of a dataset inside its [`DatasetGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A classified dataset. Its identity, product and lineage are fixed at construction.
#[derive(Debug, Clone)]
pub struct ResolvedDataset {
    id: Option<DatasetId>,
    product: Arc<Product>,
    metadata: Document,
    uris: Vec<String>,
    sources: Vec<(String, NodeId)>,
}

impl ResolvedDataset {
    pub fn new(
        id: Option<DatasetId>,
        product: Arc<Product>,
        metadata: Document,
        uris: Vec<String>,
    ) -> Self {
        Self {
            id,
            product,
            metadata,
            uris,
            sources: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<DatasetId> {
        self.id
    }

    pub fn product(&self) -> &Arc<Product> {
        &self.product
    }

    /// The metadata document, lineage field removed.
    pub fn metadata(&self) -> &Document {
        &self.metadata
    }

    /// Storage locations, primary first.
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    pub fn local_uri(&self) -> Option<&str> {
        self.uris.first().map(String::as_str)
    }

    pub fn sources(&self) -> &[(String, NodeId)] {
        &self.sources
    }

    /// Label used in logs and error reports.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => "<missing id>".to_string(),
        }
    }

    /// The product's required measurements must all be declared by the dataset.
    pub fn check_measurements(&self, layout: &DocLayout) -> Result<(), MeasurementMismatch> {
        let required = &self.product.measurements;
        if required.is_empty() {
            return Ok(());
        }

        let Some(declared) = layout.measurement_names(&self.metadata) else {
            return Err(MeasurementMismatch {
                dataset: self.label(),
                reason: "No measurements defined for a dataset".to_string(),
            });
        };

        if required.iter().all(|name| declared.contains(name)) {
            Ok(())
        } else {
            Err(MeasurementMismatch {
                dataset: self.label(),
                reason: "measurement fields don't match type specification".to_string(),
            })
        }
    }
}

/// Counters describing how a graph was resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveStats {
    /// Bulk lookups issued against the catalog.
    pub catalog_lookups: usize,
    /// Nodes classified by the signature matcher.
    pub products_matched: usize,
    /// Nodes whose product came from the catalog record.
    pub products_from_catalog: usize,
    /// References served from the per-call cache.
    pub cache_hits: usize,
    /// Lineage identities absent from the catalog.
    pub missing_lineage: usize,
}

/// Arena of resolved datasets rooted at the dataset being ingested.
#[derive(Debug, Clone)]
pub struct DatasetGraph {
    nodes: Vec<ResolvedDataset>,
    root: NodeId,
    stats: ResolveStats,
}

impl DatasetGraph {
    /// A graph holding one dataset with no lineage.
    pub fn single(dataset: ResolvedDataset) -> Self {
        let mut builder = GraphBuilder::default();
        let root = builder.push(dataset, Vec::new());
        builder.finish(root, ResolveStats::default())
    }

    pub fn root(&self) -> &ResolvedDataset {
        &self.nodes[self.root.0]
    }

    pub fn root_node(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &ResolvedDataset {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Node ids in construction order: every dataset after all of its sources.
    pub fn bottom_up(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn find(&self, id: &DatasetId) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.id.as_ref() == Some(id))
            .map(NodeId)
    }

    /// Lineage of `node` as (classifier, dataset) pairs.
    pub fn sources_of(&self, node: NodeId) -> impl Iterator<Item = (&str, &ResolvedDataset)> {
        self.nodes[node.0]
            .sources
            .iter()
            .map(|(classifier, id)| (classifier.as_str(), &self.nodes[id.0]))
    }

    /// Map the lineage of `node` to catalogue identities; anonymous sources are skipped.
    pub fn source_ids(&self, node: NodeId) -> Vec<(String, DatasetId)> {
        self.sources_of(node)
            .filter_map(|(classifier, ds)| ds.id.map(|id| (classifier.to_string(), id)))
            .collect()
    }
}

/// Bottom-up builder for a [`DatasetGraph`].
#[derive(Debug, Default)]
pub(crate) struct GraphBuilder {
    nodes: Vec<ResolvedDataset>,
}

impl GraphBuilder {
    pub(crate) fn push(
        &mut self,
        mut dataset: ResolvedDataset,
        sources: Vec<(String, NodeId)>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        debug_assert!(sources.iter().all(|(_, s)| s.0 < id.0));
        dataset.sources = sources;
        self.nodes.push(dataset);
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn finish(self, root: NodeId, stats: ResolveStats) -> DatasetGraph {
        DatasetGraph {
            nodes: self.nodes,
            root,
            stats,
        }
    }
}
