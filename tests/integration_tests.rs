//! End-to-end runs across document reading, resolution and the catalog.

use chrono::{Duration, TimeZone, Utc};
use geocat_core::doc::{DocLayout, Document};
use geocat_core::{
    derived_set, index_datasets, load_datasets, restore_datasets, ArchiveOptions, Catalog,
    DatasetGraph, DatasetId, DatasetResolver, LineagePolicy, MatchConfig, MatchError, Product,
    ProductMatcher, ProductRule, ResolveError,
};
use geocat_ingest::logged_document_stream;
use geocat_storage::{MemoryCatalog, StorageConfig};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

fn id(n: u128) -> DatasetId {
    DatasetId::from_u128(0x6765_0000_0000_4000_8000_0000_0000_0000 | n)
}

fn catalog_in(dir: &TempDir) -> MemoryCatalog {
    MemoryCatalog::new(StorageConfig {
        catalog_path: dir.path().join("catalog.json"),
    })
}

fn resolver<'c>(
    catalog: &'c MemoryCatalog,
    products: &[Arc<Product>],
    policy: LineagePolicy,
) -> DatasetResolver<'c, MemoryCatalog> {
    let rules = products.iter().cloned().map(ProductRule::from_product).collect();
    let matcher = ProductMatcher::new(rules, &MatchConfig::default(), DocLayout::default()).unwrap();
    DatasetResolver::new(catalog, matcher, DocLayout::default(), policy)
}

fn lineage_policy(fail_on_missing: bool) -> LineagePolicy {
    LineagePolicy::Resolve {
        fail_on_missing,
        verify: true,
    }
}

#[test]
fn matched_product_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);
    let product = catalog
        .add_product(Product::new("x_scene", doc(json!({"platform": "X"}))))
        .unwrap();

    let file = dir.path().join("scene.yaml");
    fs::write(&file, format!("id: {}\nplatform: X\n", id(1))).unwrap();

    let resolver = resolver(&catalog, &[product], lineage_policy(false));
    let graphs: Vec<DatasetGraph> =
        load_datasets(logged_document_stream([&file]), &resolver).collect();
    assert_eq!(graphs.len(), 1);

    let root = graphs[0].root();
    assert_eq!(root.product().name, "x_scene");
    assert!(root.sources().is_empty());
    assert_eq!(root.uris().len(), 1);
    assert!(root.uris()[0].ends_with("scene.yaml"));

    let report = index_datasets(&catalog, graphs, true, false);
    assert!(report.is_clean());
    assert!(catalog.get(&id(1)).unwrap().is_some());
}

#[test]
fn conflicting_lineage_duplicate_names_the_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);
    let product = catalog
        .add_product(Product::new("any", Document::new()))
        .unwrap();

    let root = doc(json!({
        "id": id(1).to_string(),
        "lineage": {"source_datasets": {
            "s1": {"id": id(2).to_string(), "v": 1},
            "s2": {"id": id(2).to_string(), "v": 2}
        }}
    }));

    let err = resolver(&catalog, &[product], lineage_policy(false))
        .resolve(&root, "file:///a.yaml")
        .unwrap_err();
    match &err {
        ResolveError::LineageConflict { id: conflicting, .. } => assert_eq!(*conflicting, id(2)),
        other => panic!("expected a lineage conflict, got {other}"),
    }
    assert!(err.to_string().contains(&id(2).to_string()));
    assert!(catalog.is_empty());
}

#[test]
fn ambiguous_match_lists_every_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);
    let wide = catalog
        .add_product(Product::new("wide", doc(json!({"platform": "X"}))))
        .unwrap();
    let narrow = catalog
        .add_product(Product::new("narrow", doc(json!({"instrument": "OLI"}))))
        .unwrap();

    let document = doc(json!({"id": id(1).to_string(), "platform": "X", "instrument": "OLI"}));
    let err = resolver(&catalog, &[wide, narrow], lineage_policy(false))
        .resolve(&document, "file:///d.yaml")
        .unwrap_err();
    match err {
        ResolveError::Match(MatchError::Ambiguous { products, .. }) => {
            assert!(products.contains(&"wide".to_string()));
            assert!(products.contains(&"narrow".to_string()));
        }
        other => panic!("expected an ambiguous match, got {other}"),
    }
}

#[test]
fn missing_lineage_is_gated_then_auto_added() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);
    let level1 = catalog
        .add_product(Product::new("level1", doc(json!({"level": 1}))))
        .unwrap();
    let level2 = catalog
        .add_product(Product::new("level2", doc(json!({"level": 2}))))
        .unwrap();
    let products = [level1, level2];

    let document = doc(json!({
        "id": id(3).to_string(),
        "level": 2,
        "lineage": {"source_datasets": {
            "a": {"id": id(1).to_string(), "level": 1},
            "b": {"id": id(2).to_string(), "level": 1}
        }}
    }));

    let err = resolver(&catalog, &products, lineage_policy(true))
        .resolve(&document, "file:///3.yaml")
        .unwrap_err();
    match err {
        ResolveError::MissingLineage { ids } => assert_eq!(ids, vec![id(1), id(2)]),
        other => panic!("expected missing lineage, got {other}"),
    }

    let graph = resolver(&catalog, &products, lineage_policy(false))
        .resolve(&document, "file:///3.yaml")
        .unwrap();
    let sources: Vec<_> = graph
        .sources_of(graph.root_node())
        .map(|(_, source)| source.product().name.clone())
        .collect();
    assert_eq!(sources, vec!["level1", "level1"]);

    catalog.add(&graph, true).unwrap();
    assert_eq!(catalog.len(), 3);

    // Now catalogued, the same ancestors pass the strict gate.
    let sibling = doc(json!({
        "id": id(4).to_string(),
        "level": 2,
        "lineage": {"source_datasets": {"a": {"id": id(1).to_string(), "level": 1}}}
    }));
    let graph = resolver(&catalog, &products, lineage_policy(true))
        .resolve(&sibling, "file:///4.yaml")
        .unwrap();
    assert_eq!(graph.stats().products_from_catalog, 1);
}

#[test]
fn catalogued_ancestor_verifies_against_embedded_copy() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);
    let level1 = catalog
        .add_product(Product::new("level1", doc(json!({"level": "L1"}))))
        .unwrap();
    let level2 = catalog
        .add_product(Product::new("level2", doc(json!({"level": "L2"}))))
        .unwrap();
    let products = [level1, level2];

    // The ancestor's own file carries an empty lineage section.
    let file = dir.path().join("a.yaml");
    fs::write(
        &file,
        format!("id: {}\nlevel: L1\nlineage:\n  source_datasets: {{}}\n", id(1)),
    )
    .unwrap();
    let resolver_l1 = resolver(&catalog, &products, lineage_policy(true));
    let graphs: Vec<DatasetGraph> =
        load_datasets(logged_document_stream([&file]), &resolver_l1).collect();
    assert!(index_datasets(&catalog, graphs, true, false).is_clean());

    let stored = catalog.get(&id(1)).unwrap().unwrap();
    assert_eq!(stored.metadata.to_value(), json!({"id": id(1).to_string(), "level": "L1"}));

    // Embedded without any lineage key, the copy still matches the catalogue.
    let document = doc(json!({
        "id": id(2).to_string(),
        "level": "L2",
        "lineage": {"source_datasets": {"a": {"id": id(1).to_string(), "level": "L1"}}}
    }));
    let graph = resolver(&catalog, &products, lineage_policy(true))
        .resolve(&document, "file:///b.yaml")
        .unwrap();
    assert_eq!(graph.stats().products_from_catalog, 1);
    catalog.add(&graph, true).unwrap();

    // A real difference is still reported.
    let drifted = doc(json!({
        "id": id(3).to_string(),
        "level": "L2",
        "lineage": {"source_datasets": {"a": {"id": id(1).to_string(), "level": "L1", "cloud": 3}}}
    }));
    let err = resolver(&catalog, &products, lineage_policy(true))
        .resolve(&drifted, "file:///c.yaml")
        .unwrap_err();
    assert!(matches!(err, ResolveError::LineageInconsistent { .. }));
    assert!(err.to_string().contains("cloud"));
}

#[test]
fn shared_ancestor_is_one_node() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);
    let product = catalog
        .add_product(Product::new("any", Document::new()))
        .unwrap();

    let base = json!({"id": id(1).to_string(), "kind": "base"});
    let document = doc(json!({
        "id": id(4).to_string(),
        "lineage": {"source_datasets": {
            "left": {"id": id(2).to_string(), "lineage": {"source_datasets": {"base": base.clone()}}},
            "right": {"id": id(3).to_string(), "lineage": {"source_datasets": {"base": base}}}
        }}
    }));

    let graph = resolver(&catalog, &[product], lineage_policy(false))
        .resolve(&document, "file:///4.yaml")
        .unwrap();
    assert_eq!(graph.len(), 4);

    let left = graph.find(&id(2)).unwrap();
    let right = graph.find(&id(3)).unwrap();
    assert_eq!(graph.node(left).sources()[0].1, graph.node(right).sources()[0].1);
    assert_eq!(graph.stats().catalog_lookups, 1);
}

#[test]
fn restore_respects_archive_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);
    let product = catalog
        .add_product(Product::new("any", Document::new()))
        .unwrap();

    // 1 <- 2 (archived at T+300), 1 <- 3 (archived at T+900)
    let resolver = resolver(&catalog, &[product], lineage_policy(false));
    for (n, uri) in [(2, "file:///2.yaml"), (3, "file:///3.yaml")] {
        let document = doc(json!({
            "id": id(n).to_string(),
            "lineage": {"source_datasets": {"src": {"id": id(1).to_string()}}}
        }));
        catalog.add(&resolver.resolve(&document, uri).unwrap(), true).unwrap();
    }

    let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut snapshot = catalog.snapshot();
    for dataset in &mut snapshot.datasets {
        let offset = match dataset.id {
            d if d == id(1) => 0,
            d if d == id(2) => 300,
            _ => 900,
        };
        dataset.archived_time = Some(t + Duration::seconds(offset));
    }
    snapshot.save(&catalog.config().catalog_path).unwrap();
    let catalog = MemoryCatalog::open(catalog.config().clone()).unwrap();

    let mut restored = Vec::new();
    let report = restore_datasets(
        &catalog,
        &[id(1)],
        ArchiveOptions {
            derived: true,
            dry_run: false,
        },
        Duration::seconds(600),
        |entry| restored.push(entry.id),
    );
    assert!(report.is_clean());
    restored.sort();
    assert_eq!(restored, vec![id(1), id(2)]);

    assert!(!catalog.get(&id(1)).unwrap().unwrap().is_archived());
    assert!(!catalog.get(&id(2)).unwrap().unwrap().is_archived());
    assert!(catalog.get(&id(3)).unwrap().unwrap().is_archived());

    let walked: Vec<_> = derived_set(&catalog, &id(1))
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(walked.len(), 3);
    assert_eq!(walked[0], id(1));
}
