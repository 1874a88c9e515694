//! `geocat product ...`

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use geocat_core::doc::{DocLayout, Document};
use geocat_core::{Catalog, Product};
use geocat_ingest::read_documents;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::Session;

/// Build a product from its definition document:
/// `name`, optional `description`, `metadata` signature and optional `measurements`.
fn product_from_definition(definition: &Document) -> Result<Product> {
    let map = definition.as_map();
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("product definition has no name"))?;
    let metadata = map
        .get("metadata")
        .cloned()
        .ok_or_else(|| anyhow!("product {name} has no metadata signature"))?;
    let metadata = Document::from_value(metadata)
        .with_context(|| format!("metadata signature of product {name}"))?;

    let mut product = Product::new(name, metadata).with_measurements(
        DocLayout::default()
            .measurement_names(definition)
            .unwrap_or_default(),
    );
    product.description = map
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);
    Ok(product)
}

pub(crate) fn cmd_add(session: &Session, files: &[PathBuf]) -> Result<ExitCode> {
    let mut failed = 0usize;
    for file in files {
        let documents = match read_documents(file) {
            Ok(documents) => documents,
            Err(err) => {
                tracing::error!(path = %file.display(), error = %err, "skipping product file");
                failed += 1;
                continue;
            }
        };
        for (uri, definition) in documents {
            let added = product_from_definition(&definition)
                .and_then(|product| Ok(session.catalog.add_product(product)?));
            match added {
                Ok(product) => eprintln!("{} product {}", "added".green().bold(), product.name.bold()),
                Err(err) => {
                    tracing::error!(uri = %uri, error = %err, "failed to add product");
                    failed += 1;
                }
            }
        }
    }
    session.catalog.save()?;
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub(crate) fn cmd_list(session: &Session) -> Result<ExitCode> {
    let products = session.catalog.products()?;
    if products.is_empty() {
        eprintln!("{} no products registered", "info:".yellow().bold());
    }
    for product in products {
        println!(
            "{}\t{}",
            product.name,
            product.description.as_deref().unwrap_or("")
        );
    }
    Ok(ExitCode::SUCCESS)
}
