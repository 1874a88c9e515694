//! Products and the rules used to classify documents into them.

use geocat_doc::Document;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::{Catalog, CatalogError};

/// A registered product: a named family of datasets sharing a metadata signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Partial document every member dataset must structurally contain.
    pub metadata: Document,
    /// Measurements every member dataset must declare. May be empty.
    #[serde(default)]
    pub measurements: Vec<String>,
}

impl Product {
    pub fn new(name: impl Into<String>, metadata: Document) -> Self {
        Self {
            name: name.into(),
            description: None,
            metadata,
            measurements: Vec::new(),
        }
    }

    pub fn with_measurements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.measurements = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A product plus the signature documents must contain to belong to it.
#[derive(Debug, Clone)]
pub struct ProductRule {
    pub product: Arc<Product>,
    pub signature: Document,
}

impl ProductRule {
    /// Rule whose signature is the product's own metadata document.
    pub fn from_product(product: Arc<Product>) -> Self {
        let signature = product.metadata.clone();
        Self { product, signature }
    }
}

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Supplied product name \"{0}\" not present in the database")]
    UnknownProduct(String),
    #[error("Found no products in the database")]
    NoProducts,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Matching rules for the named products, or for every product when `names` is empty.
pub fn load_rules<C: Catalog + ?Sized>(
    catalog: &C,
    names: &[String],
) -> Result<Vec<ProductRule>, RulesError> {
    let products = if names.is_empty() {
        catalog.products()?
    } else {
        let mut products = Vec::with_capacity(names.len());
        for name in names {
            match catalog.product_by_name(name)? {
                Some(product) => products.push(product),
                None => return Err(RulesError::UnknownProduct(name.clone())),
            }
        }
        products
    };

    if products.is_empty() {
        return Err(RulesError::NoProducts);
    }

    Ok(products.into_iter().map(ProductRule::from_product).collect())
}
