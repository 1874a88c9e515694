//! Batch ingestion: resolve a stream of documents and hand them to the catalog.
//!
//! Every document stands alone. A failure is logged, counted and skipped;
//! it never stops the rest of the batch.

use geocat_doc::Document;
use serde::Serialize;
use std::fmt;

use crate::{Catalog, DatasetGraph, DatasetId, DatasetResolver};

/// Per-item success and failure counts of a batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record<E: fmt::Display>(&mut self, id: &DatasetId, result: Result<(), E>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(err) => {
                tracing::error!(id = %id, error = %err, "{id}: {err}");
                self.failed += 1;
            }
        }
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} successful, {} failed", self.succeeded, self.failed)
    }
}

/// Lazily resolved datasets. Documents that fail to resolve are logged and skipped.
pub struct LoadedDatasets<'r, 'c, C: Catalog + ?Sized, I> {
    docs: I,
    resolver: &'r DatasetResolver<'c, C>,
    failed: usize,
}

impl<C: Catalog + ?Sized, I> LoadedDatasets<'_, '_, C, I> {
    /// Documents skipped so far.
    pub fn failed(&self) -> usize {
        self.failed
    }
}

impl<C, I> Iterator for LoadedDatasets<'_, '_, C, I>
where
    C: Catalog + ?Sized,
    I: Iterator<Item = (String, Document)>,
{
    type Item = DatasetGraph;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (uri, doc) = self.docs.next()?;
            match self.resolver.resolve_checked(&doc, &uri) {
                Ok(graph) => return Some(graph),
                Err(err) => {
                    tracing::error!(uri = %uri, error = %err, "failed to resolve dataset");
                    self.failed += 1;
                }
            }
        }
    }
}

/// Resolve each `(uri, document)` pair as it is pulled.
pub fn load_datasets<'r, 'c, C, I>(
    docs: I,
    resolver: &'r DatasetResolver<'c, C>,
) -> LoadedDatasets<'r, 'c, C, I::IntoIter>
where
    C: Catalog + ?Sized,
    I: IntoIterator<Item = (String, Document)>,
{
    LoadedDatasets {
        docs: docs.into_iter(),
        resolver,
        failed: 0,
    }
}

/// Add every resolved graph to the catalog. With `dry_run` nothing is written.
pub fn index_datasets<C, I>(catalog: &C, graphs: I, with_lineage: bool, dry_run: bool) -> BatchReport
where
    C: Catalog + ?Sized,
    I: IntoIterator<Item = DatasetGraph>,
{
    let mut report = BatchReport::default();
    for graph in graphs {
        let root = graph.root();
        tracing::info!(
            id = %root.label(),
            product = %root.product().name,
            nodes = graph.len(),
            "Matched {}",
            root.label()
        );
        if dry_run {
            report.succeeded += 1;
            continue;
        }
        match catalog.add(&graph, with_lineage) {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                tracing::error!(
                    uri = root.local_uri().unwrap_or_default(),
                    error = %err,
                    "Failed to add dataset"
                );
                report.failed += 1;
            }
        }
    }
    report
}
