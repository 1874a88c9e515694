//! Signature matching: which product does a document belong to?
//!
//! A document belongs to a product when it structurally contains the
//! product's signature. With a single rule a miss is reported as a
//! side-by-side of the signature and the document's values under the
//! signature's fields; with several rules the match must be unique.

use geocat_doc::{contains_with, DocLayout, Document};
use serde_json::Map;
use std::sync::Arc;
use thiserror::Error;

use crate::{MatchConfig, Product, ProductRule};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(
        "Dataset metadata did not match product signature.\nDataset definition:\n {relevant}\n\nProduct signature:\n {signature}\n"
    )]
    SignatureMismatch {
        product: String,
        relevant: Document,
        signature: Document,
    },
    #[error("No matching Product found for dataset {dataset}")]
    NoMatch { dataset: String },
    #[error("Auto match failed, dataset {dataset} matches several products:\n  {}", .products.join(","))]
    Ambiguous {
        dataset: String,
        products: Vec<String>,
    },
    #[error("at least one product rule is required")]
    NoRules,
}

/// Pure function of (document, rules): no catalog access, no state.
#[derive(Debug, Clone)]
pub struct ProductMatcher {
    rules: Vec<ProductRule>,
    case_sensitive: bool,
    layout: DocLayout,
}

impl ProductMatcher {
    pub fn new(
        rules: Vec<ProductRule>,
        config: &MatchConfig,
        layout: DocLayout,
    ) -> Result<Self, MatchError> {
        if rules.is_empty() {
            return Err(MatchError::NoRules);
        }
        Ok(Self {
            rules,
            case_sensitive: config.case_sensitive,
            layout,
        })
    }

    pub fn rules(&self) -> &[ProductRule] {
        &self.rules
    }

    pub fn match_document(&self, doc: &Document) -> Result<Arc<Product>, MatchError> {
        if let [rule] = self.rules.as_slice() {
            return self.match_single(rule, doc);
        }

        let matched: Vec<&ProductRule> = self
            .rules
            .iter()
            .filter(|rule| contains_with(doc, &rule.signature, self.case_sensitive))
            .collect();

        match matched.as_slice() {
            [only] => Ok(Arc::clone(&only.product)),
            [] => Err(MatchError::NoMatch {
                dataset: self.dataset_label(doc),
            }),
            several => Err(MatchError::Ambiguous {
                dataset: self.dataset_label(doc),
                products: several.iter().map(|r| r.product.name.clone()).collect(),
            }),
        }
    }

    fn match_single(&self, rule: &ProductRule, doc: &Document) -> Result<Arc<Product>, MatchError> {
        if contains_with(doc, &rule.signature, self.case_sensitive) {
            return Ok(Arc::clone(&rule.product));
        }

        let relevant: Map<_, _> = doc
            .as_map()
            .iter()
            .filter(|(k, _)| rule.signature.as_map().contains_key(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Err(MatchError::SignatureMismatch {
            product: rule.product.name.clone(),
            relevant: Document::from(relevant),
            signature: rule.signature.clone(),
        })
    }

    fn dataset_label(&self, doc: &Document) -> String {
        match self.layout.identity(doc) {
            Ok(Some(id)) => id.to_string(),
            _ => "<missing id>".to_string(),
        }
    }
}
