//! Geocat CLI
//!
//! Command-line interface for:
//! - Registering products (`product add`, `product list`)
//! - Indexing metadata documents with their lineage (`dataset add`)
//! - Updating indexed datasets under explicit change rules (`dataset update`)
//! - Inspecting, archiving and restoring datasets (`dataset info/archive/restore`)

use anyhow::Result;
use clap::{Parser, Subcommand};
use geocat_core::{CatalogConfig, DatasetId, LocationPolicy};
use geocat_storage::{MemoryCatalog, StorageConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod dataset;
mod output;
mod product;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "geocat")]
#[command(author, version, about = "Geocat: catalog of geospatial datasets and their lineage")]
struct Cli {
    /// Resolution settings (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog snapshot file.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and list products.
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },

    /// Index, update, inspect, archive and restore datasets.
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Add product definitions from YAML/JSON files.
    Add {
        files: Vec<PathBuf>,
    },
    /// List registered products.
    List,
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Index datasets (and, by default, their lineage).
    ///
    /// Each path is a metadata file, a directory holding `agdc-metadata.yaml`,
    /// or a data file with a sibling `<name>.agdc-md.yaml`.
    Add {
        paths: Vec<PathBuf>,

        /// Only match against this product (repeatable). Default: all products.
        #[arg(short, long = "product")]
        products: Vec<String>,

        /// Fail when a lineage dataset is not already indexed instead of adding it.
        #[arg(long = "no-auto-add-lineage", action = clap::ArgAction::SetFalse)]
        auto_add_lineage: bool,

        /// Skip comparing embedded lineage documents with the catalogued ones.
        #[arg(long = "no-verify-lineage", action = clap::ArgAction::SetFalse)]
        verify_lineage: bool,

        /// Drop lineage information entirely.
        #[arg(long)]
        ignore_lineage: bool,

        /// Required together with --ignore-lineage.
        #[arg(long)]
        confirm_ignore_lineage: bool,

        /// Resolve and report, write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Update indexed datasets from new versions of their metadata.
    Update {
        paths: Vec<PathBuf>,

        /// Allow any change to this dotted field (repeatable), e.g. `properties.cloud_cover`.
        #[arg(long = "allow-any", value_name = "FIELD")]
        allow_any: Vec<String>,

        /// What to do with the previously recorded location: keep, archive or forget.
        #[arg(long, default_value = "keep")]
        location_policy: LocationPolicy,

        /// Check whether the update would be allowed, write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show indexed datasets.
    Info {
        ids: Vec<DatasetId>,

        /// Include the datasets each one was derived from.
        #[arg(long)]
        show_sources: bool,

        /// Include the datasets derived from each one.
        #[arg(long)]
        show_derived: bool,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,

        /// Levels of sources/derived datasets to follow.
        #[arg(long, default_value_t = 99)]
        max_depth: usize,
    },

    /// Archive datasets.
    Archive {
        ids: Vec<DatasetId>,

        /// Also archive every dataset derived from these.
        #[arg(short = 'd', long)]
        archive_derived: bool,

        #[arg(long)]
        dry_run: bool,
    },

    /// Restore archived datasets.
    Restore {
        ids: Vec<DatasetId>,

        /// Also restore derived datasets archived around the same time.
        #[arg(short = 'd', long)]
        restore_derived: bool,

        /// Window around the target's archive time for derived datasets.
        #[arg(long)]
        derived_tolerance_seconds: Option<i64>,

        #[arg(long)]
        dry_run: bool,
    },
}

/// Settings plus the opened catalog, shared by every command.
pub(crate) struct Session {
    pub config: CatalogConfig,
    pub catalog: MemoryCatalog,
}

impl Session {
    fn open(config: Option<&Path>, catalog: Option<PathBuf>) -> Result<Self> {
        let config = match config {
            Some(path) => CatalogConfig::load(path)?,
            None => CatalogConfig::default(),
        };
        let mut storage = StorageConfig::default();
        if let Some(path) = catalog {
            storage.catalog_path = path;
        }
        tracing::debug!(catalog = %storage.catalog_path.display(), "opening catalog");
        let catalog = MemoryCatalog::open(storage)?;
        Ok(Self { config, catalog })
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info,geocat=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let session = Session::open(cli.config.as_deref(), cli.catalog)?;

    match cli.command {
        Commands::Product { command } => match command {
            ProductCommands::Add { files } => product::cmd_add(&session, &files),
            ProductCommands::List => product::cmd_list(&session),
        },
        Commands::Dataset { command } => match command {
            DatasetCommands::Add {
                paths,
                products,
                auto_add_lineage,
                verify_lineage,
                ignore_lineage,
                confirm_ignore_lineage,
                dry_run,
            } => {
                if ignore_lineage && !confirm_ignore_lineage {
                    anyhow::bail!(
                        "--ignore-lineage records datasets without their sources; \
                         pass --confirm-ignore-lineage to proceed"
                    );
                }
                dataset::cmd_add(
                    &session,
                    &paths,
                    &dataset::AddOptions {
                        products,
                        auto_add_lineage,
                        verify_lineage,
                        ignore_lineage,
                        dry_run,
                    },
                )
            }
            DatasetCommands::Update {
                paths,
                allow_any,
                location_policy,
                dry_run,
            } => dataset::cmd_update(&session, &paths, &allow_any, location_policy, dry_run),
            DatasetCommands::Info {
                ids,
                show_sources,
                show_derived,
                format,
                max_depth,
            } => dataset::cmd_info(
                &session,
                &ids,
                &geocat_core::InfoOptions {
                    show_sources,
                    show_derived,
                    max_depth,
                },
                format,
            ),
            DatasetCommands::Archive {
                ids,
                archive_derived,
                dry_run,
            } => dataset::cmd_archive(&session, &ids, archive_derived, dry_run),
            DatasetCommands::Restore {
                ids,
                restore_derived,
                derived_tolerance_seconds,
                dry_run,
            } => dataset::cmd_restore(
                &session,
                &ids,
                restore_derived,
                derived_tolerance_seconds,
                dry_run,
            ),
        },
    }
}
