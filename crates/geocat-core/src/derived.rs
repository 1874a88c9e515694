//! Cascading archive and restore over the "derived from" relation.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

use crate::{BatchReport, Catalog, CatalogEntry, CatalogError, DatasetId};

/// `root` and every dataset transitively derived from it, root first, in
/// breadth-first order. Each dataset is visited once even when the relation
/// has redundant edges.
pub fn derived_set<C: Catalog + ?Sized>(
    catalog: &C,
    root: &DatasetId,
) -> Result<Vec<CatalogEntry>, CatalogError> {
    let root_entry = catalog.get(root)?.ok_or(CatalogError::NotFound(*root))?;

    let mut visited: HashSet<DatasetId> = HashSet::from([*root]);
    let mut queue: VecDeque<DatasetId> = VecDeque::from([*root]);
    let mut out = vec![root_entry];

    while let Some(current) = queue.pop_front() {
        for derived in catalog.get_derived(&current)? {
            if visited.insert(derived.id) {
                queue.push_back(derived.id);
                out.push(derived);
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Cascade to every derived dataset.
    pub derived: bool,
    /// Select but do not change anything.
    pub dry_run: bool,
}

/// Datasets archived along with `id`.
pub fn archive_selection<C: Catalog + ?Sized>(
    catalog: &C,
    id: &DatasetId,
    derived: bool,
) -> Result<Vec<CatalogEntry>, CatalogError> {
    if derived {
        derived_set(catalog, id)
    } else {
        Ok(vec![catalog.get(id)?.ok_or(CatalogError::NotFound(*id))?])
    }
}

/// Datasets restored along with `id`: only archived ones and, when cascading
/// from an archived target, only those archived within `tolerance` of it.
pub fn restore_selection<C: Catalog + ?Sized>(
    catalog: &C,
    id: &DatasetId,
    derived: bool,
    tolerance: Duration,
) -> Result<Vec<CatalogEntry>, CatalogError> {
    let candidates = archive_selection(catalog, id, derived)?;
    tracing::debug!(selected = candidates.len(), "restore candidates");

    let target_time = candidates.first().and_then(|target| target.archived_time);
    let selected: Vec<CatalogEntry> = candidates
        .into_iter()
        .filter(|entry| match (entry.archived_time, target_time) {
            (None, _) => false,
            (Some(t), Some(target)) if derived => within(t, target, tolerance),
            (Some(_), _) => true,
        })
        .collect();

    tracing::debug!(selected = selected.len(), "restore selection after archive filter");
    Ok(selected)
}

/// `t` lies in `[target - tolerance, target + tolerance]`. A bound beyond the
/// representable time range leaves that side open.
fn within(t: DateTime<Utc>, target: DateTime<Utc>, tolerance: Duration) -> bool {
    let after_start = match target.checked_sub_signed(tolerance) {
        Some(start) => start <= t,
        None => true,
    };
    let before_end = match target.checked_add_signed(tolerance) {
        Some(end) => t <= end,
        None => true,
    };
    after_start && before_end
}

/// Archive each of `ids` (and, optionally, what derives from it).
/// `on_selected` sees every dataset before it is archived.
pub fn archive_datasets<C, F>(
    catalog: &C,
    ids: &[DatasetId],
    options: ArchiveOptions,
    mut on_selected: F,
) -> BatchReport
where
    C: Catalog + ?Sized,
    F: FnMut(&CatalogEntry),
{
    let mut report = BatchReport::default();
    for id in ids {
        let result = archive_selection(catalog, id, options.derived).and_then(|selection| {
            for entry in &selection {
                tracing::info!(
                    "archiving {} {} {}",
                    entry.product.name,
                    entry.id,
                    entry.local_uri().unwrap_or("None")
                );
                on_selected(entry);
            }
            if !options.dry_run {
                let selected: Vec<DatasetId> = selection.iter().map(|e| e.id).collect();
                catalog.archive(&selected)?;
            }
            Ok(())
        });
        report.record(id, result);
    }
    report
}

/// Restore each of `ids` (and, optionally, what derives from it and was
/// archived within `tolerance` of it).
pub fn restore_datasets<C, F>(
    catalog: &C,
    ids: &[DatasetId],
    options: ArchiveOptions,
    tolerance: Duration,
    mut on_selected: F,
) -> BatchReport
where
    C: Catalog + ?Sized,
    F: FnMut(&CatalogEntry),
{
    let mut report = BatchReport::default();
    for id in ids {
        let result = restore_selection(catalog, id, options.derived, tolerance).and_then(|selection| {
            for entry in &selection {
                tracing::info!(
                    "restoring {} {} {}",
                    entry.product.name,
                    entry.id,
                    entry.local_uri().unwrap_or("None")
                );
                on_selected(entry);
            }
            if !options.dry_run {
                let selected: Vec<DatasetId> = selection.iter().map(|e| e.id).collect();
                catalog.restore(&selected)?;
            }
            Ok(())
        });
        report.record(id, result);
    }
    report
}
