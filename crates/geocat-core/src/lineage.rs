//! Lineage deduplication.
//!
//! A document's lineage field embeds whole ancestor documents, which embed
//! their own ancestors, and the same ancestor often shows up at several
//! places in the tree. [`dedup_lineage`] walks the tree depth-first and
//! produces a [`LineageGraph`] in which every identity appears once:
//!
//! - the first occurrence of an identity is recorded; later occurrences
//!   become references to it
//! - a later occurrence whose body (lineage excluded) differs from the
//!   recorded one is a conflict and aborts the walk
//! - an occurrence of an identity inside its own ancestry is a cycle and
//!   aborts the walk, so the graph is acyclic by construction
//! - documents without an identity become their own, unshared node
//!
//! Node indices are assigned in pre-order; index 0 is always the root.

use geocat_doc::{document_changes, render_differences, DocError, DocLayout, Difference, Document};
use serde_json::Map;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use crate::DatasetId;

#[derive(Debug, Error)]
pub enum LineageError {
    #[error("Inconsistent lineage for repeated dataset {id}: {}", render_differences(.differences))]
    Conflict {
        id: DatasetId,
        differences: Vec<Difference>,
    },
    #[error("Dataset {id} appears in its own lineage")]
    Cycle { id: DatasetId },
    #[error(transparent)]
    Document(#[from] DocError),
}

/// One distinct dataset of a lineage tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageNode {
    pub id: Option<DatasetId>,
    /// The document with its lineage field removed.
    pub document: Document,
    /// Lineage classifier and the index of the referenced node, in document order.
    pub sources: Vec<(String, usize)>,
}

/// A deduplicated lineage tree. Owns every document it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageGraph {
    nodes: Vec<LineageNode>,
    by_id: HashMap<DatasetId, usize>,
}

impl LineageGraph {
    pub const ROOT: usize = 0;

    pub fn root(&self) -> &LineageNode {
        &self.nodes[Self::ROOT]
    }

    pub fn node(&self, index: usize) -> &LineageNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[LineageNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, id: &DatasetId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Lineage-free document of the dataset with identity `id`.
    pub fn document(&self, id: &DatasetId) -> Option<&Document> {
        self.index_of(id).map(|i| &self.nodes[i].document)
    }

    /// Every identity in the graph, root included.
    pub fn identities(&self) -> BTreeSet<DatasetId> {
        self.by_id.keys().copied().collect()
    }

    /// Identity to lineage-free document, for bulk catalog lookups.
    pub fn flat(&self) -> HashMap<DatasetId, &Document> {
        self.by_id
            .iter()
            .map(|(id, &i)| (*id, &self.nodes[i].document))
            .collect()
    }

    /// Re-embed the graph as a nested document. Shared nodes are embedded at
    /// every position that references them.
    pub fn to_document(&self, layout: &DocLayout) -> Result<Document, DocError> {
        self.embed(Self::ROOT, layout)
    }

    fn embed(&self, index: usize, layout: &DocLayout) -> Result<Document, DocError> {
        let node = &self.nodes[index];
        if node.sources.is_empty() {
            return Ok(node.document.clone());
        }
        let mut sources = Map::new();
        for (classifier, child) in &node.sources {
            sources.insert(classifier.clone(), self.embed(*child, layout)?.into_value());
        }
        layout.with_lineage(&node.document, sources)
    }
}

/// Collapse the lineage tree under `root` into a [`LineageGraph`].
pub fn dedup_lineage(root: &Document, layout: &DocLayout) -> Result<LineageGraph, LineageError> {
    let mut builder = Builder {
        layout,
        nodes: Vec::new(),
        by_id: HashMap::new(),
        open: HashSet::new(),
    };
    builder.visit(root)?;
    Ok(LineageGraph {
        nodes: builder.nodes,
        by_id: builder.by_id,
    })
}

struct Builder<'a> {
    layout: &'a DocLayout,
    nodes: Vec<LineageNode>,
    by_id: HashMap<DatasetId, usize>,
    /// Identities whose subtree is still being walked.
    open: HashSet<DatasetId>,
}

impl Builder<'_> {
    fn visit(&mut self, doc: &Document) -> Result<usize, LineageError> {
        let id = self.layout.identity(doc)?;
        let body = self.layout.without_lineage(doc);

        if let Some(id) = id {
            if let Some(&seen) = self.by_id.get(&id) {
                if self.open.contains(&id) {
                    return Err(LineageError::Cycle { id });
                }
                let differences = document_changes(&self.nodes[seen].document, &body);
                if !differences.is_empty() {
                    return Err(LineageError::Conflict { id, differences });
                }
                return Ok(seen);
            }
        }

        let index = self.nodes.len();
        self.nodes.push(LineageNode {
            id,
            document: body,
            sources: Vec::new(),
        });
        if let Some(id) = id {
            self.by_id.insert(id, index);
            self.open.insert(id);
        }

        let mut sources = Vec::new();
        for (classifier, child) in self.layout.lineage(doc)? {
            let child_index = self.visit(&child)?;
            sources.push((classifier, child_index));
        }
        self.nodes[index].sources = sources;

        if let Some(id) = id {
            self.open.remove(&id);
        }
        Ok(index)
    }
}
