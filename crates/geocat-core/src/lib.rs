//! Geocat dataset resolution
//!
//! Turns free-form metadata documents into fully classified dataset records
//! ready to be written to a catalog:
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ raw document │──►│   lineage    │──►│ catalog bulk │──►│   lineage    │
//! │ (+ ancestors)│   │    dedup     │   │    lookup    │   │ verification │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 │
//!                    ┌──────────────┐   ┌──────────────┐          ▼
//!                    │ catalog add  │◄──│ DatasetGraph │◄── memoized, bottom-up
//!                    │  / update    │   │   (arena)    │    construction
//!                    └──────────────┘   └──────────────┘    (product matching)
//! ```
//!
//! The catalog itself is an external collaborator reached through the
//! [`Catalog`] trait. Everything here is read-only against the catalog until
//! the caller hands a resolved graph back for insertion or update.

pub mod catalog;
pub mod config;
pub mod derived;
pub mod error;
pub mod info;
pub mod lineage;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod product;
pub mod resolver;
pub mod update;

#[cfg(test)]
mod testing;

pub use geocat_doc as doc;

pub use catalog::{Catalog, CatalogEntry};
pub use config::{CatalogConfig, MatchConfig, RestoreConfig};
pub use derived::{
    archive_datasets, archive_selection, derived_set, restore_datasets, restore_selection,
    ArchiveOptions,
};
pub use error::{CatalogError, LineageInconsistency, MeasurementMismatch, ResolveError};
pub use info::{dataset_info, DatasetInfo, InfoOptions};
pub use lineage::{dedup_lineage, LineageError, LineageGraph, LineageNode};
pub use matcher::{MatchError, ProductMatcher};
pub use model::{DatasetGraph, NodeId, ResolveStats, ResolvedDataset};
pub use pipeline::{index_datasets, load_datasets, BatchReport, LoadedDatasets};
pub use product::{load_rules, Product, ProductRule, RulesError};
pub use resolver::{DatasetResolver, LineagePolicy};
pub use update::{
    classify_update, load_for_update, reconcile_location, update_datasets, LocationOutcome,
    LocationPolicy, UpdateCandidate, UpdateError, UpdateOptions,
};

/// Dataset identity.
pub type DatasetId = uuid::Uuid;
