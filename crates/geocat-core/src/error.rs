use geocat_doc::{render_differences, DocError, Difference};
use thiserror::Error;

use crate::{DatasetId, LineageError, MatchError};

/// Failure reported by a [`Catalog`](crate::Catalog) implementation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No such dataset in the database: {0}")]
    NotFound(DatasetId),
    #[error("Dataset {0} is already indexed")]
    Duplicate(DatasetId),
    #[error("Unknown product: {0}")]
    UnknownProduct(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("Dataset {dataset} inconsistency: {reason}")]
pub struct MeasurementMismatch {
    pub dataset: String,
    pub reason: String,
}

/// A lineage document that disagrees with its catalogued record.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageInconsistency {
    pub id: DatasetId,
    pub differences: Vec<Difference>,
}

fn render_inconsistencies(reports: &[LineageInconsistency]) -> String {
    reports
        .iter()
        .map(|r| {
            format!(
                "Inconsistent lineage dataset {}:\n> {}",
                r.id,
                render_differences(&r.differences)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_ids(ids: &[DatasetId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a document could not be resolved. Always fatal to that document only.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("Inconsistent lineage for repeated dataset {id}: {}", render_differences(.differences))]
    LineageConflict {
        id: DatasetId,
        differences: Vec<Difference>,
    },
    #[error("Dataset {id} appears in its own lineage")]
    LineageCycle { id: DatasetId },
    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] DocError),
    #[error("Following lineage datasets are missing from DB: {}", render_ids(.ids))]
    MissingLineage { ids: Vec<DatasetId> },
    #[error("{}", render_inconsistencies(.reports))]
    LineageInconsistent { reports: Vec<LineageInconsistency> },
    #[error(transparent)]
    MeasurementMismatch(#[from] MeasurementMismatch),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<LineageError> for ResolveError {
    fn from(err: LineageError) -> Self {
        match err {
            LineageError::Conflict { id, differences } => Self::LineageConflict { id, differences },
            LineageError::Cycle { id } => Self::LineageCycle { id },
            LineageError::Document(err) => Self::InvalidDocument(err),
        }
    }
}
