//! `geocat dataset ...`

use anyhow::Result;
use colored::Colorize;
use geocat_core::doc::ChangeRules;
use geocat_core::{
    archive_datasets, dataset_info, index_datasets, load_datasets, load_for_update, load_rules,
    restore_datasets, update_datasets, ArchiveOptions, BatchReport, Catalog, CatalogEntry,
    DatasetId, DatasetResolver, InfoOptions, LineagePolicy, LocationPolicy, ProductMatcher,
    RestoreConfig, UpdateOptions,
};
use geocat_ingest::document_stream;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::output::{write_infos, OutputFormat};
use crate::Session;

pub(crate) struct AddOptions {
    pub products: Vec<String>,
    pub auto_add_lineage: bool,
    pub verify_lineage: bool,
    pub ignore_lineage: bool,
    pub dry_run: bool,
}

fn finish(session: &Session, report: &BatchReport, dry_run: bool) -> Result<ExitCode> {
    if !dry_run {
        session.catalog.save()?;
    }
    let summary = report.to_string();
    if report.is_clean() {
        eprintln!("{} {}", "ok".green().bold(), summary);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{} {}", "failed".red().bold(), summary);
        Ok(ExitCode::FAILURE)
    }
}

fn log_unreadable(path: &Path, err: &dyn std::fmt::Display) {
    tracing::error!(path = %path.display(), error = %err, "skipping dataset");
}

pub(crate) fn cmd_add(session: &Session, paths: &[PathBuf], options: &AddOptions) -> Result<ExitCode> {
    let layout = session.config.layout.clone();
    let rules = load_rules(&session.catalog, &options.products)?;
    let matcher = ProductMatcher::new(rules, &session.config.matching, layout.clone())?;
    let policy = LineagePolicy::from_flags(
        options.ignore_lineage,
        !options.auto_add_lineage,
        options.verify_lineage,
    );
    let resolver = DatasetResolver::new(&session.catalog, matcher, layout, policy);

    let mut unreadable = 0usize;
    let mut report = {
        let docs = document_stream(paths, |path, err| {
            log_unreadable(path, &err);
            unreadable += 1;
        });
        let mut loaded = load_datasets(docs, &resolver);
        let mut report = index_datasets(
            &session.catalog,
            loaded.by_ref(),
            options.auto_add_lineage,
            options.dry_run,
        );
        report.failed += loaded.failed();
        report
    };
    report.failed += unreadable;

    finish(session, &report, options.dry_run)
}

pub(crate) fn cmd_update(
    session: &Session,
    paths: &[PathBuf],
    allow_any: &[String],
    location_policy: LocationPolicy,
    dry_run: bool,
) -> Result<ExitCode> {
    let layout = &session.config.layout;
    let options = UpdateOptions {
        rules: ChangeRules::allow_any_keys(allow_any)?,
        location_policy,
        dry_run,
    };

    let mut unreadable = 0usize;
    let mut rejected = 0usize;
    let mut candidates = Vec::new();
    let docs = document_stream(paths, |path, err| {
        log_unreadable(path, &err);
        unreadable += 1;
    });
    for (uri, doc) in docs {
        match load_for_update(&session.catalog, layout, &doc, &uri) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => {
                tracing::error!(uri = %uri, error = %err, "Failed to update dataset");
                rejected += 1;
            }
        }
    }

    let mut report = update_datasets(&session.catalog, candidates, &options);
    report.failed += unreadable + rejected;
    finish(session, &report, dry_run)
}

pub(crate) fn cmd_info(
    session: &Session,
    ids: &[DatasetId],
    options: &InfoOptions,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut infos = Vec::with_capacity(ids.len());
    let mut missing = 0usize;
    for id in ids {
        match session.catalog.get(id)? {
            Some(entry) => infos.push(dataset_info(&session.catalog, &entry, options)?),
            None => {
                eprintln!("{} {} missing", "error:".red().bold(), id);
                missing += 1;
            }
        }
    }

    write_infos(format, &infos, std::io::stdout().lock())?;
    Ok(ExitCode::from(u8::try_from(missing).unwrap_or(u8::MAX)))
}

fn print_selected(verb: &'static str, dry_run: bool) -> impl FnMut(&CatalogEntry) {
    move |entry: &CatalogEntry| {
        let verb = if dry_run {
            format!("would {verb}")
        } else {
            verb.to_string()
        };
        println!(
            "{} {} {} {}",
            verb.bold(),
            entry.product.name,
            entry.id,
            entry.local_uri().unwrap_or("None")
        );
    }
}

pub(crate) fn cmd_archive(
    session: &Session,
    ids: &[DatasetId],
    derived: bool,
    dry_run: bool,
) -> Result<ExitCode> {
    let options = ArchiveOptions { derived, dry_run };
    let report = archive_datasets(
        &session.catalog,
        ids,
        options,
        print_selected("archive", dry_run),
    );
    finish(session, &report, dry_run)
}

pub(crate) fn cmd_restore(
    session: &Session,
    ids: &[DatasetId],
    derived: bool,
    tolerance_secs: Option<i64>,
    dry_run: bool,
) -> Result<ExitCode> {
    let restore = match tolerance_secs {
        Some(derived_tolerance_secs) => RestoreConfig {
            derived_tolerance_secs,
        },
        None => session.config.restore,
    };
    let tolerance = restore.tolerance()?;
    let options = ArchiveOptions { derived, dry_run };
    let report = restore_datasets(
        &session.catalog,
        ids,
        options,
        tolerance,
        print_selected("restore", dry_run),
    );
    finish(session, &report, dry_run)
}
