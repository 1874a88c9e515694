//! Dataset resolution.
//!
//! ```text
//!   Document ──► dedup_lineage ──► bulk_get(all ids) ──► missing? ──► verify? ──► build
//!                     │                                                          │
//!               conflict/cycle                                  memoized, bottom-up
//! ```
//!
//! [`LineagePolicy`] selects one of two strategies at the call boundary:
//!
//! - `Skip`: strip lineage, match the product, return a one-node graph. No
//!   catalog access at all.
//! - `Resolve`: the full pipeline above. The catalog is consulted exactly
//!   once per call; every distinct identity is classified at most once and
//!   becomes one arena node shared by every position that references it.
//!
//! Resolution never writes to the catalog.

use geocat_doc::{document_changes, DocLayout, Document};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::model::GraphBuilder;
use crate::{
    dedup_lineage, Catalog, CatalogEntry, DatasetGraph, DatasetId, LineageGraph,
    LineageInconsistency, NodeId, ProductMatcher, ResolveError, ResolveStats, ResolvedDataset,
};

/// How lineage embedded in a document is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineagePolicy {
    /// Ignore lineage entirely.
    Skip,
    /// Cross-reference lineage against the catalog.
    Resolve {
        /// Abort when a lineage dataset is not catalogued.
        fail_on_missing: bool,
        /// Abort when a catalogued lineage dataset differs from its embedded copy.
        verify: bool,
    },
}

impl LineagePolicy {
    pub fn from_flags(skip_lineage: bool, fail_on_missing: bool, verify: bool) -> Self {
        if skip_lineage {
            Self::Skip
        } else {
            Self::Resolve {
                fail_on_missing,
                verify,
            }
        }
    }
}

impl Default for LineagePolicy {
    fn default() -> Self {
        Self::Resolve {
            fail_on_missing: false,
            verify: true,
        }
    }
}

pub struct DatasetResolver<'c, C: Catalog + ?Sized> {
    catalog: &'c C,
    matcher: ProductMatcher,
    layout: DocLayout,
    policy: LineagePolicy,
}

impl<'c, C: Catalog + ?Sized> DatasetResolver<'c, C> {
    pub fn new(
        catalog: &'c C,
        matcher: ProductMatcher,
        layout: DocLayout,
        policy: LineagePolicy,
    ) -> Self {
        Self {
            catalog,
            matcher,
            layout,
            policy,
        }
    }

    pub fn policy(&self) -> LineagePolicy {
        self.policy
    }

    pub fn layout(&self) -> &DocLayout {
        &self.layout
    }

    pub fn matcher(&self) -> &ProductMatcher {
        &self.matcher
    }

    /// Resolve `doc`, stored at `uri`, into a dataset graph.
    pub fn resolve(&self, doc: &Document, uri: &str) -> Result<DatasetGraph, ResolveError> {
        match self.policy {
            LineagePolicy::Skip => self.resolve_flat(doc, uri),
            LineagePolicy::Resolve {
                fail_on_missing,
                verify,
            } => self.resolve_lineage(doc, uri, fail_on_missing, verify),
        }
    }

    /// [`resolve`](Self::resolve), then require the root's measurements to
    /// satisfy its product. This is the form to use before persisting.
    pub fn resolve_checked(&self, doc: &Document, uri: &str) -> Result<DatasetGraph, ResolveError> {
        let graph = self.resolve(doc, uri)?;
        graph.root().check_measurements(&self.layout)?;
        Ok(graph)
    }

    fn resolve_flat(&self, doc: &Document, uri: &str) -> Result<DatasetGraph, ResolveError> {
        let id = self.layout.identity(doc)?;
        let body = self.layout.without_lineage(doc);
        let product = self.matcher.match_document(&body)?;

        let mut builder = GraphBuilder::default();
        let root = builder.push(
            ResolvedDataset::new(id, product, body, vec![uri.to_string()]),
            Vec::new(),
        );
        let stats = ResolveStats {
            products_matched: 1,
            ..ResolveStats::default()
        };
        Ok(builder.finish(root, stats))
    }

    fn resolve_lineage(
        &self,
        doc: &Document,
        uri: &str,
        fail_on_missing: bool,
        verify: bool,
    ) -> Result<DatasetGraph, ResolveError> {
        let lineage = dedup_lineage(doc, &self.layout)?;
        let root_id = lineage.root().id;

        let mut stats = ResolveStats::default();
        let ids = lineage.identities();
        let known = if ids.is_empty() {
            HashMap::new()
        } else {
            stats.catalog_lookups += 1;
            self.catalog.bulk_get(&ids)?
        };

        let lineage_ids: BTreeSet<DatasetId> = ids
            .iter()
            .copied()
            .filter(|id| Some(*id) != root_id)
            .collect();
        let missing: Vec<DatasetId> = lineage_ids
            .iter()
            .copied()
            .filter(|id| !known.contains_key(id))
            .collect();
        stats.missing_lineage = missing.len();

        tracing::debug!(
            identities = ids.len(),
            known = known.len(),
            missing = missing.len(),
            "lineage lookup"
        );

        if fail_on_missing && !missing.is_empty() {
            return Err(ResolveError::MissingLineage { ids: missing });
        }

        if verify {
            let reports = verify_lineage(&lineage, &lineage_ids, &known);
            if !reports.is_empty() {
                return Err(ResolveError::LineageInconsistent { reports });
            }
        }

        let mut ctx = ResolveContext {
            lineage: &lineage,
            known: &known,
            uri,
            cache: HashMap::new(),
            builder: GraphBuilder::default(),
            stats,
        };
        let root = ctx.resolve_node(&self.matcher, LineageGraph::ROOT)?;
        let stats = ctx.stats;

        tracing::debug!(
            nodes = ctx.builder.len(),
            matched = stats.products_matched,
            from_catalog = stats.products_from_catalog,
            cache_hits = stats.cache_hits,
            "resolved dataset graph"
        );
        Ok(ctx.builder.finish(root, stats))
    }
}

impl<C: Catalog + Sync + ?Sized> DatasetResolver<'_, C> {
    /// Resolve independent documents in parallel. Each document gets its own
    /// context; results keep input order.
    pub fn resolve_batch(
        &self,
        docs: &[(String, Document)],
    ) -> Vec<Result<DatasetGraph, ResolveError>> {
        docs.par_iter()
            .map(|(uri, doc)| self.resolve_checked(doc, uri))
            .collect()
    }
}

/// Compare every catalogued lineage document with its embedded copy.
fn verify_lineage(
    lineage: &LineageGraph,
    lineage_ids: &BTreeSet<DatasetId>,
    known: &HashMap<DatasetId, CatalogEntry>,
) -> Vec<LineageInconsistency> {
    lineage_ids
        .iter()
        .filter_map(|id| {
            let catalogued = known.get(id)?;
            let parsed = lineage.document(id)?;
            let differences = document_changes(parsed, &catalogued.metadata);
            (!differences.is_empty()).then(|| LineageInconsistency {
                id: *id,
                differences,
            })
        })
        .collect()
}

/// State of one lineage-aware resolution. Never outlives the call that created it.
struct ResolveContext<'a> {
    lineage: &'a LineageGraph,
    known: &'a HashMap<DatasetId, CatalogEntry>,
    uri: &'a str,
    cache: HashMap<DatasetId, NodeId>,
    builder: GraphBuilder,
    stats: ResolveStats,
}

impl ResolveContext<'_> {
    fn resolve_node(
        &mut self,
        matcher: &ProductMatcher,
        index: usize,
    ) -> Result<NodeId, ResolveError> {
        let node = self.lineage.node(index);
        if let Some(id) = node.id {
            if let Some(&cached) = self.cache.get(&id) {
                self.stats.cache_hits += 1;
                return Ok(cached);
            }
        }

        let mut sources = Vec::with_capacity(node.sources.len());
        for (classifier, child) in &node.sources {
            sources.push((classifier.clone(), self.resolve_node(matcher, *child)?));
        }

        let product = match node.id.and_then(|id| self.known.get(&id)) {
            Some(entry) => {
                self.stats.products_from_catalog += 1;
                Arc::clone(&entry.product)
            }
            None => {
                self.stats.products_matched += 1;
                matcher.match_document(&node.document)?
            }
        };

        let uris = if index == LineageGraph::ROOT {
            vec![self.uri.to_string()]
        } else {
            Vec::new()
        };

        let dataset = ResolvedDataset::new(node.id, product, node.document.clone(), uris);
        let resolved = self.builder.push(dataset, sources);
        if let Some(id) = node.id {
            self.cache.insert(id, resolved);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{doc, entry, uuid, StubCatalog};
    use crate::{MatchConfig, MatchError, Product, ProductRule};
    use geocat_doc::FieldPath;
    use serde_json::{json, Value};

    fn layout() -> DocLayout {
        DocLayout {
            sources: FieldPath::keys(["sources"]),
            ..DocLayout::default()
        }
    }

    fn rule(name: &str, signature: Value) -> ProductRule {
        ProductRule::from_product(Arc::new(Product::new(name, doc(signature))))
    }

    fn resolver<'c>(
        catalog: &'c StubCatalog,
        rules: Vec<ProductRule>,
        policy: LineagePolicy,
    ) -> DatasetResolver<'c, StubCatalog> {
        let matcher = ProductMatcher::new(rules, &MatchConfig::default(), layout()).unwrap();
        DatasetResolver::new(catalog, matcher, layout(), policy)
    }

    /// A <- {B, C}, B <- {D}, C <- {D}: D is referenced twice.
    fn diamond() -> Document {
        let d = json!({"id": uuid(4).to_string(), "platform": "X", "level": 0});
        doc(json!({
            "id": uuid(1).to_string(),
            "platform": "X",
            "level": 2,
            "sources": {
                "left": {"id": uuid(2).to_string(), "platform": "X", "level": 1, "sources": {"raw": d.clone()}},
                "right": {"id": uuid(3).to_string(), "platform": "X", "level": 1, "sources": {"raw": d}},
            }
        }))
    }

    #[test]
    fn matched_product_without_lineage() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::default());

        let graph = r
            .resolve(&doc(json!({"id": uuid(1).to_string(), "platform": "X"})), "file:///a.yaml")
            .unwrap();

        assert_eq!(graph.len(), 1);
        let root = graph.root();
        assert_eq!(root.id(), Some(uuid(1)));
        assert_eq!(root.product().name, "x");
        assert!(root.sources().is_empty());
        assert_eq!(root.uris(), ["file:///a.yaml".to_string()]);
    }

    #[test]
    fn shared_ancestor_resolves_to_one_node() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::default());

        let graph = r.resolve(&diamond(), "file:///a.yaml").unwrap();
        assert_eq!(graph.len(), 4);

        let root = graph.root_node();
        let (_, left) = graph.root().sources()[0];
        let (_, right) = graph.root().sources()[1];
        let (_, via_left) = graph.node(left).sources()[0];
        let (_, via_right) = graph.node(right).sources()[0];
        assert_eq!(via_left, via_right);
        assert_eq!(graph.node(via_left).id(), Some(uuid(4)));
        assert_ne!(via_left, root);

        let stats = graph.stats();
        assert_eq!(catalog.bulk_get_calls(), 1);
        assert_eq!(stats.catalog_lookups, 1);
        assert_eq!(stats.products_matched, 4);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn only_the_root_gets_a_location() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::default());
        let graph = r.resolve(&diamond(), "file:///a.yaml").unwrap();
        for node in graph.bottom_up() {
            let expected = usize::from(node == graph.root_node());
            assert_eq!(graph.node(node).uris().len(), expected);
        }
    }

    #[test]
    fn lineage_is_stripped_from_every_node() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::default());
        let graph = r.resolve(&diamond(), "file:///a.yaml").unwrap();
        let path = FieldPath::keys(["sources"]);
        assert!(graph.bottom_up().all(|n| graph.node(n).metadata().get(&path).is_none()));
    }

    #[test]
    fn catalogued_lineage_keeps_its_product() {
        let catalog = StubCatalog::new();
        let old = catalog.add_product(Product::new("legacy", doc(json!({"platform": "OLD"}))));
        catalog.insert_entry(entry(uuid(4), &old, json!({"id": uuid(4).to_string(), "platform": "X", "level": 0})));

        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::default());
        let graph = r.resolve(&diamond(), "file:///a.yaml").unwrap();

        let d = graph.find(&uuid(4)).unwrap();
        assert_eq!(graph.node(d).product().name, "legacy");
        assert_eq!(graph.stats().products_from_catalog, 1);
        assert_eq!(graph.stats().products_matched, 3);
    }

    #[test]
    fn missing_lineage_gating() {
        let catalog = StubCatalog::new();
        let x = catalog.add_product(Product::new("x", doc(json!({"platform": "X"}))));
        catalog.insert_entry(entry(uuid(2), &x, json!({"id": uuid(2).to_string(), "platform": "X", "level": 1})));

        let strict = resolver(
            &catalog,
            vec![rule("x", json!({"platform": "X"}))],
            LineagePolicy::Resolve {
                fail_on_missing: true,
                verify: false,
            },
        );
        match strict.resolve(&diamond(), "file:///a.yaml") {
            Err(ResolveError::MissingLineage { ids }) => assert_eq!(ids, vec![uuid(3), uuid(4)]),
            other => panic!("expected missing lineage, got {other:?}"),
        }

        let lenient = resolver(
            &catalog,
            vec![rule("x", json!({"platform": "X"}))],
            LineagePolicy::Resolve {
                fail_on_missing: false,
                verify: false,
            },
        );
        let graph = lenient.resolve(&diamond(), "file:///a.yaml").unwrap();
        assert_eq!(graph.stats().missing_lineage, 2);
        assert_eq!(graph.stats().products_matched, 3);
    }

    #[test]
    fn missing_root_is_not_missing_lineage() {
        let catalog = StubCatalog::new();
        let r = resolver(
            &catalog,
            vec![rule("x", json!({"platform": "X"}))],
            LineagePolicy::Resolve {
                fail_on_missing: true,
                verify: true,
            },
        );
        assert!(r
            .resolve(&doc(json!({"id": uuid(1).to_string(), "platform": "X"})), "file:///a")
            .is_ok());
    }

    #[test]
    fn verification_reports_every_inconsistent_dataset() {
        let catalog = StubCatalog::new();
        let x = catalog.add_product(Product::new("x", doc(json!({"platform": "X"}))));
        catalog.insert_entry(entry(uuid(2), &x, json!({"id": uuid(2).to_string(), "platform": "X", "level": 9})));
        catalog.insert_entry(entry(uuid(4), &x, json!({"id": uuid(4).to_string(), "platform": "Y", "level": 0})));

        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::default());
        match r.resolve(&diamond(), "file:///a.yaml") {
            Err(ResolveError::LineageInconsistent { reports }) => {
                assert_eq!(reports.len(), 2);
                assert_eq!(reports[0].id, uuid(2));
                assert_eq!(reports[0].differences[0].path.to_string(), "level");
                assert_eq!(reports[1].id, uuid(4));
                assert_eq!(reports[1].differences[0].path.to_string(), "platform");
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }

        let unverified = resolver(
            &catalog,
            vec![rule("x", json!({"platform": "X"}))],
            LineagePolicy::Resolve {
                fail_on_missing: false,
                verify: false,
            },
        );
        assert!(unverified.resolve(&diamond(), "file:///a.yaml").is_ok());
    }

    #[test]
    fn conflicting_duplicate_aborts_before_catalog_access() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({}))], LineagePolicy::default());
        let root = doc(json!({
            "id": uuid(1).to_string(),
            "sources": {
                "s1": {"id": uuid(2).to_string(), "v": 1},
                "s2": {"id": uuid(2).to_string(), "v": 2},
            }
        }));
        match r.resolve(&root, "file:///a") {
            Err(ResolveError::LineageConflict { id, .. }) => assert_eq!(id, uuid(2)),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(catalog.bulk_get_calls(), 0);
    }

    #[test]
    fn ancestor_citing_its_descendant_aborts_before_catalog_access() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({}))], LineagePolicy::default());
        let root = doc(json!({
            "id": uuid(1).to_string(),
            "sources": {
                "parent": {
                    "id": uuid(2).to_string(),
                    "sources": {"back": {"id": uuid(1).to_string()}}
                }
            }
        }));
        let err = r.resolve(&root, "file:///a").unwrap_err();
        match &err {
            ResolveError::LineageCycle { id } => assert_eq!(*id, uuid(1)),
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(err.to_string().contains(&uuid(1).to_string()));
        assert_eq!(catalog.bulk_get_calls(), 0);
    }

    #[test]
    fn unmatched_lineage_fails_the_whole_document() {
        let catalog = StubCatalog::new();
        let r = resolver(
            &catalog,
            vec![rule("x", json!({"platform": "X"})), rule("y", json!({"platform": "Y"}))],
            LineagePolicy::default(),
        );
        let root = doc(json!({
            "id": uuid(1).to_string(),
            "platform": "X",
            "sources": {"s": {"id": uuid(2).to_string(), "platform": "Z"}}
        }));
        assert!(matches!(
            r.resolve(&root, "file:///a"),
            Err(ResolveError::Match(MatchError::NoMatch { .. }))
        ));
    }

    #[test]
    fn skip_policy_never_touches_the_catalog() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::Skip);
        let graph = r.resolve(&diamond(), "file:///a.yaml").unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.root().sources().is_empty());
        assert!(graph.root().metadata().get(&FieldPath::keys(["sources"])).is_none());
        assert_eq!(catalog.bulk_get_calls(), 0);
    }

    #[test]
    fn checked_resolution_enforces_measurements() {
        let catalog = StubCatalog::new();
        let product = Product::new("x", doc(json!({"platform": "X"}))).with_measurements(["red"]);
        let r = resolver(
            &catalog,
            vec![ProductRule::from_product(Arc::new(product))],
            LineagePolicy::Skip,
        );
        let bare = doc(json!({"id": uuid(1).to_string(), "platform": "X"}));
        assert!(r.resolve(&bare, "file:///a").is_ok());
        assert!(matches!(
            r.resolve_checked(&bare, "file:///a"),
            Err(ResolveError::MeasurementMismatch(_))
        ));
    }

    #[test]
    fn batch_keeps_input_order() {
        let catalog = StubCatalog::new();
        let r = resolver(&catalog, vec![rule("x", json!({"platform": "X"}))], LineagePolicy::default());
        let docs: Vec<(String, Document)> = (1..=8)
            .map(|n| {
                let platform = if n == 5 { "Q" } else { "X" };
                (
                    format!("file:///{n}.yaml"),
                    doc(json!({"id": uuid(n).to_string(), "platform": platform})),
                )
            })
            .collect();

        let results = r.resolve_batch(&docs);
        assert_eq!(results.len(), 8);
        for (n, result) in (1..=8u128).zip(&results) {
            if n == 5 {
                assert!(result.is_err());
            } else {
                assert_eq!(result.as_ref().unwrap().root().id(), Some(uuid(n)));
            }
        }
    }
}
