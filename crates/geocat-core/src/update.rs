//! Updating already-indexed datasets.
//!
//! An update document is resolved against the product of the dataset it
//! replaces; lineage is never consulted. Whether the update may be committed
//! is decided by [`ChangeRules`] over the differences between the catalogued
//! metadata and the new one.
//!
//! Location reconciliation is a separate step that only runs when the
//! catalogued dataset has exactly one location. With several locations there
//! is no way to tell which one the update replaces, so nothing is touched and
//! a warning is logged.

use geocat_doc::{document_changes, ChangeRules, ClassifiedChanges, DocError, DocLayout, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{
    BatchReport, Catalog, CatalogEntry, CatalogError, DatasetId, MeasurementMismatch,
    ResolvedDataset,
};

/// Split the changes from `existing` to `new` into safe and unsafe ones.
pub fn classify_update(existing: &Document, new: &Document, rules: &ChangeRules) -> ClassifiedChanges {
    rules.classify(document_changes(existing, new))
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Metadata document is missing id field")]
    MissingIdentity,
    #[error("No such dataset in the database: {0}")]
    NotIndexed(DatasetId),
    #[error(transparent)]
    Document(#[from] DocError),
    #[error(transparent)]
    Measurement(#[from] MeasurementMismatch),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A new version of a dataset, with the record it replaces.
#[derive(Debug, Clone)]
pub struct UpdateCandidate {
    pub dataset: ResolvedDataset,
    pub existing: CatalogEntry,
}

impl UpdateCandidate {
    pub fn changes(&self, rules: &ChangeRules) -> ClassifiedChanges {
        classify_update(&self.existing.metadata, self.dataset.metadata(), rules)
    }
}

/// Build the replacement dataset for `doc`, found at `uri`.
pub fn load_for_update<C: Catalog + ?Sized>(
    catalog: &C,
    layout: &DocLayout,
    doc: &Document,
    uri: &str,
) -> Result<UpdateCandidate, UpdateError> {
    let id = layout.identity(doc)?.ok_or(UpdateError::MissingIdentity)?;
    let existing = catalog.get(&id)?.ok_or(UpdateError::NotIndexed(id))?;

    let dataset = ResolvedDataset::new(
        Some(id),
        existing.product.clone(),
        layout.without_lineage(doc),
        vec![uri.to_string()],
    );
    dataset.check_measurements(layout)?;

    Ok(UpdateCandidate { dataset, existing })
}

/// What happens to the previously recorded location of an updated dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPolicy {
    /// Keep it as an alternative location.
    #[default]
    Keep,
    /// Mark it archived.
    Archive,
    /// Remove it from the catalog.
    Forget,
}

impl LocationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationPolicy::Keep => "keep",
            LocationPolicy::Archive => "archive",
            LocationPolicy::Forget => "forget",
        }
    }
}

impl fmt::Display for LocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Self::Keep),
            "archive" => Ok(Self::Archive),
            "forget" => Ok(Self::Forget),
            other => Err(format!(
                "unknown location policy '{other}', expected keep, archive or forget"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOutcome {
    /// Nothing to reconcile.
    Unchanged,
    /// Several old locations; left alone.
    Skipped,
    /// Dry run: the policy would have been applied.
    WouldApply,
    /// The policy was applied to the old location.
    Applied,
}

/// Apply `policy` to the old location of `candidate`.
pub fn reconcile_location<C: Catalog + ?Sized>(
    catalog: &C,
    candidate: &UpdateCandidate,
    policy: LocationPolicy,
    dry_run: bool,
) -> Result<LocationOutcome, CatalogError> {
    if policy == LocationPolicy::Keep {
        return Ok(LocationOutcome::Unchanged);
    }

    let old_uri = match candidate.existing.locations.as_slice() {
        [] => return Ok(LocationOutcome::Unchanged),
        [only] => only,
        _ => {
            tracing::warn!(
                id = %candidate.existing.id,
                policy = %policy,
                "Refusing to {policy} old location, there are several"
            );
            return Ok(LocationOutcome::Skipped);
        }
    };

    let Some(new_uri) = candidate.dataset.local_uri() else {
        return Ok(LocationOutcome::Unchanged);
    };
    if new_uri == old_uri {
        return Ok(LocationOutcome::Unchanged);
    }

    if dry_run {
        tracing::info!("Will {policy} old location {old_uri}, and add new one {new_uri}");
        return Ok(LocationOutcome::WouldApply);
    }

    let id = candidate.existing.id;
    match policy {
        LocationPolicy::Archive => catalog.archive_location(&id, old_uri)?,
        LocationPolicy::Forget => catalog.remove_location(&id, old_uri)?,
        LocationPolicy::Keep => false,
    };
    Ok(LocationOutcome::Applied)
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub rules: ChangeRules,
    pub location_policy: LocationPolicy,
    pub dry_run: bool,
}

/// Update (or, dry-run, check) every candidate; a failure only affects its own dataset.
pub fn update_datasets<C, I>(catalog: &C, candidates: I, options: &UpdateOptions) -> BatchReport
where
    C: Catalog + ?Sized,
    I: IntoIterator<Item = UpdateCandidate>,
{
    let mut report = BatchReport::default();
    for candidate in candidates {
        let label = candidate.dataset.label();
        tracing::info!(id = %label, "Matched {label}");

        let result = if options.dry_run {
            check_update(catalog, &candidate, &options.rules)
        } else {
            catalog
                .update(&candidate.dataset, &options.rules)
                .map(|()| {
                    tracing::info!("Updated {label}");
                    true
                })
        };

        let ok = result.and_then(|updated| {
            if updated {
                reconcile_location(catalog, &candidate, options.location_policy, options.dry_run)?;
            }
            Ok(updated)
        });

        match ok {
            Ok(true) => report.succeeded += 1,
            Ok(false) => report.failed += 1,
            Err(err) => {
                tracing::error!(id = %label, error = %err, "Failed to update {label}: {err}");
                report.failed += 1;
            }
        }
    }
    tracing::info!("{report}");
    report
}

fn check_update<C: Catalog + ?Sized>(
    catalog: &C,
    candidate: &UpdateCandidate,
    rules: &ChangeRules,
) -> Result<bool, CatalogError> {
    let label = candidate.dataset.label();
    let changes = catalog.can_update(&candidate.dataset, rules)?;
    let verdict = if changes.is_safe() { "Can" } else { "Cannot" };
    tracing::info!(
        "{verdict} update {label}: {} unsafe changes, {} safe changes",
        changes.unsafe_changes.len(),
        changes.safe_changes.len()
    );
    Ok(changes.is_safe())
}
