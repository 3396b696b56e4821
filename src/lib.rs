//! Labelsift: restrict YOLO label datasets to a subset of classes.
//!
//! Labelsift rewrites every label file of one or more dataset splits so that
//! only the selected classes remain, renumbered contiguously in ascending
//! order of their original index. Output is assembled next to each split and
//! swapped in by directory rename; the original split is kept as
//! `original_<split>` and the live result is validated before the dataset
//! config's `nc`/`names` fields are rewritten.
//!
//! # Modules
//!
//! - [`selection`]: Class catalogs and the class-selection seam
//! - [`remap`]: Deterministic index mapping and the per-run context
//! - [`filter`]: Line classification and streaming file filtering
//! - [`pipeline`]: Split staging, swap, rollback and run reports
//! - [`validation`]: Post-swap range validation
//! - [`config`]: Dataset config rewriting with backup
//! - [`error`]: Error types for labelsift operations

pub mod config;
pub mod error;
pub mod filter;
pub mod layout;
pub mod pipeline;
pub mod remap;
pub mod selection;
pub mod validation;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub use error::LabelsiftError;

use config::{restore_config, RewriteOptions, TrailingPolicy};
use filter::OutputPolicy;
use layout::SplitLayout;
use pipeline::{rollback_split, run_filter, FilterPlan, PipelineOptions};
use remap::RunContext;
use selection::catalog::{coco80, read_catalog, read_yaml_names};
use selection::{ClassCatalog, ClassSelector, IndexSelector, NameSelector};
use validation::{validate_split, ValidationReport};

/// The labelsift CLI application.
#[derive(Parser)]
#[command(name = "labelsift")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Keep only the selected classes in one or more splits and renumber them.
    Filter(FilterArgs),
    /// Check that every class index in the given splits is in range.
    Validate(ValidateArgs),
    /// Restore splits (and optionally the config) from their backups.
    Rollback(RollbackArgs),
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Arguments for the filter subcommand.
#[derive(clap::Args)]
struct FilterArgs {
    /// Directory containing the split directories (e.g. `labels/`).
    #[arg(long)]
    root: PathBuf,

    /// Split directory to process (repeatable, e.g. `--split train2017 --split val2017`).
    #[arg(long = "split", required = true)]
    splits: Vec<String>,

    /// Original class indices to keep, comma-separated.
    #[arg(long, value_delimiter = ',', conflicts_with = "keep_names")]
    keep: Vec<usize>,

    /// Class names to keep, comma-separated, resolved against the catalog.
    #[arg(long = "keep-names", value_delimiter = ',')]
    keep_names: Vec<String>,

    /// Names to write for the kept classes, in ascending index order.
    #[arg(long, value_delimiter = ',', requires = "keep")]
    names: Vec<String>,

    /// Class catalog file (`classes.txt` or a YAML file with `names`).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Dataset config whose `nc`/`names` fields are rewritten after filtering.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drop every config line after the names field.
    #[arg(long)]
    truncate_after_names: bool,

    /// Copy label files that would not change instead of rewriting them.
    #[arg(long)]
    skip_unchanged: bool,

    /// Process the files of each split in parallel.
    #[arg(long)]
    parallel: bool,

    /// Restore a split from its backup automatically when validation fails.
    #[arg(long)]
    auto_rollback: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Directory containing the split directories.
    #[arg(long)]
    root: PathBuf,

    /// Split directory to validate (repeatable).
    #[arg(long = "split", required = true)]
    splits: Vec<String>,

    /// Number of classes; valid indices are `0..classes`.
    #[arg(long)]
    classes: usize,

    /// Output format for the report.
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Arguments for the rollback subcommand.
#[derive(clap::Args)]
struct RollbackArgs {
    /// Directory containing the split directories.
    #[arg(long)]
    root: PathBuf,

    /// Split directory to restore (repeatable).
    #[arg(long = "split")]
    splits: Vec<String>,

    /// Dataset config to restore from its `.bak` copy.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Run the labelsift CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LabelsiftError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Filter(args)) => run_filter_command(args),
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Rollback(args)) => run_rollback(args),
        None => {
            println!("labelsift {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Restrict YOLO label datasets to a subset of classes.");
            println!();
            println!("Run 'labelsift --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the filter subcommand.
fn run_filter_command(args: FilterArgs) -> Result<(), LabelsiftError> {
    let catalog = load_catalog(args.catalog.as_deref(), args.config.as_deref())?;

    let selector: Box<dyn ClassSelector> = if args.keep_names.is_empty() {
        Box::new(IndexSelector {
            indices: args.keep,
            names: (!args.names.is_empty()).then_some(args.names),
        })
    } else {
        Box::new(NameSelector {
            names: args.keep_names,
        })
    };

    // Everything about the selection is settled here, before any file is touched.
    let ctx = RunContext::from_selector(catalog, selector.as_ref())?;
    log::info!(
        "retaining {} of {} class(es): {}",
        ctx.class_count(),
        ctx.catalog().len(),
        ctx.retained_names().join(", ")
    );

    let plan = FilterPlan {
        root: args.root,
        splits: args.splits,
        options: PipelineOptions {
            output_policy: if args.skip_unchanged {
                OutputPolicy::SkipUnchanged
            } else {
                OutputPolicy::Always
            },
            parallel: args.parallel,
            auto_rollback: args.auto_rollback,
        },
        config: args.config,
        rewrite: RewriteOptions {
            trailing: if args.truncate_after_names {
                TrailingPolicy::TruncateAfterNames
            } else {
                TrailingPolicy::PreserveTrailing
            },
        },
    };

    let report = run_filter(&ctx, &plan);
    emit(&report, args.output)?;

    if report.is_success() {
        Ok(())
    } else {
        Err(LabelsiftError::RunFailed {
            message: format!(
                "{} of {} split(s) failed{}",
                report.failed_splits(),
                report.splits.len(),
                if report.config_failed() {
                    "; config rewrite failed"
                } else {
                    ""
                }
            ),
        })
    }
}

/// Pick the class catalog: explicit file, then the dataset config, then COCO.
///
/// A config that cannot supply names is an error here, before any split is
/// touched, unless `--catalog` overrides it.
fn load_catalog(
    catalog: Option<&Path>,
    config: Option<&Path>,
) -> Result<ClassCatalog, LabelsiftError> {
    match (catalog, config) {
        (Some(path), _) => read_catalog(path),
        (None, Some(path)) => read_yaml_names(path),
        (None, None) => {
            log::info!("no catalog or config given; using the built-in COCO catalog");
            Ok(coco80())
        }
    }
}

/// Validation result for one split.
#[derive(Serialize)]
struct SplitValidation {
    split: String,
    report: ValidationReport,
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), LabelsiftError> {
    if args.classes == 0 {
        return Err(LabelsiftError::InvalidArgument(
            "--classes must be greater than 0".to_string(),
        ));
    }

    let mut results = Vec::with_capacity(args.splits.len());
    for split in &args.splits {
        let layout = SplitLayout::new(&args.root, split)?;
        let report = validate_split(&layout.live, args.classes)?;
        results.push(SplitValidation {
            split: split.clone(),
            report,
        });
    }

    match args.output {
        OutputFormat::Json => print_json(&results)?,
        OutputFormat::Text => {
            for result in &results {
                println!("Split '{}':", result.split);
                print!("{}", result.report);
            }
        }
    }

    match results.into_iter().find(|result| !result.report.is_ok()) {
        Some(failed) => Err(LabelsiftError::IntegrityViolation {
            split: failed.split,
            error_count: failed.report.error_count(),
            report: failed.report,
        }),
        None => Ok(()),
    }
}

/// Execute the rollback subcommand.
fn run_rollback(args: RollbackArgs) -> Result<(), LabelsiftError> {
    if args.splits.is_empty() && args.config.is_none() {
        return Err(LabelsiftError::InvalidArgument(
            "nothing to roll back: pass --split and/or --config".to_string(),
        ));
    }

    let mut failures = Vec::new();

    for split in &args.splits {
        let result = SplitLayout::new(&args.root, split).and_then(|layout| {
            rollback_split(&layout)?;
            Ok(layout)
        });
        match result {
            Ok(layout) => println!(
                "Restored split '{}' from {}",
                split,
                layout.backup.display()
            ),
            Err(err) => {
                println!("[ERROR] {}", err);
                failures.push(split.clone());
            }
        }
    }

    if let Some(config) = &args.config {
        match restore_config(config) {
            Ok(()) => println!("Restored config {}", config.display()),
            Err(err) => {
                println!("[ERROR] {}", err);
                failures.push(config.display().to_string());
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(LabelsiftError::RunFailed {
            message: format!("rollback failed for: {}", failures.join(", ")),
        })
    }
}

fn emit<T: Serialize + std::fmt::Display>(
    report: &T,
    output: OutputFormat,
) -> Result<(), LabelsiftError> {
    match output {
        OutputFormat::Json => print_json(report),
        OutputFormat::Text => {
            print!("{}", report);
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), LabelsiftError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| LabelsiftError::Io(std::io::Error::other(err)))?;
    println!("{}", json);
    Ok(())
}
