//! Split processing and the directory swap.
//!
//! A split is filtered into a staging directory next to it. Only when every
//! file succeeded is the live directory renamed to its backup name and the
//! staging directory renamed into its place; the result is then validated.
//! The backup is never deleted here.

mod report;

pub use report::{ConfigStep, FileFailure, FileReport, RunReport, SplitOutcome, SplitReport};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::{rewrite_dataset_config, RewriteOptions};
use crate::error::LabelsiftError;
use crate::filter::{process_file, OutputPolicy};
use crate::layout::{collect_split_entries, SplitEntry, SplitLayout};
use crate::remap::RunContext;
use crate::validation::validate_split;

/// Issues printed to the log when validation fails.
const MAX_LOGGED_ISSUES: usize = 20;

/// Options for processing splits.
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    pub output_policy: OutputPolicy,
    /// Process files of a split concurrently.
    pub parallel: bool,
    /// Restore the backup automatically when validation fails.
    pub auto_rollback: bool,
}

/// A complete filter run: splits under one root plus an optional config.
#[derive(Clone, Debug)]
pub struct FilterPlan {
    pub root: PathBuf,
    pub splits: Vec<String>,
    pub options: PipelineOptions,
    pub config: Option<PathBuf>,
    pub rewrite: RewriteOptions,
}

/// Run every split of the plan, then rewrite the config.
///
/// The config is only rewritten when every split was swapped and validated,
/// so it never describes classes the live labels do not use.
pub fn run_filter(ctx: &RunContext, plan: &FilterPlan) -> RunReport {
    let mut report = RunReport {
        class_count: ctx.class_count(),
        names: ctx.retained_names().to_vec(),
        index_map: ctx.index_map().iter().collect(),
        ..Default::default()
    };

    for split in &plan.splits {
        let split_report = match SplitLayout::new(&plan.root, split) {
            Ok(layout) => process_split(ctx, &layout, &plan.options),
            Err(err) => {
                let mut failed = SplitReport::new(split.as_str());
                failed.error = Some(err.to_string());
                failed
            }
        };
        log::info!("split '{}': {}", split_report.split, split_report.outcome);
        report.splits.push(split_report);
    }

    if let Some(config_path) = &plan.config {
        let path = config_path.display().to_string();
        let failed = report.failed_splits();
        report.config = Some(if failed > 0 {
            log::warn!("leaving {} untouched: {} split(s) failed", path, failed);
            ConfigStep::Skipped {
                path,
                reason: format!(
                    "{} split(s) did not complete; config left untouched",
                    failed
                ),
            }
        } else {
            match rewrite_dataset_config(config_path, ctx, &plan.rewrite) {
                Ok(rewrite) => ConfigStep::Rewritten(rewrite),
                Err(err) => {
                    log::error!("config rewrite failed: {}", err);
                    ConfigStep::Failed {
                        path,
                        error: err.to_string(),
                    }
                }
            }
        });
    }

    report
}

/// Filter one split, swap it into place and validate the result.
pub fn process_split(
    ctx: &RunContext,
    layout: &SplitLayout,
    opts: &PipelineOptions,
) -> SplitReport {
    let mut report = stage_split(ctx, layout, opts);
    promote_split(ctx, layout, opts, &mut report);
    report
}

/// Filter every file of a split into its staging directory.
///
/// On success the report's outcome is [`SplitOutcome::Staged`] and the live
/// directory is untouched. On any file failure the staging directory is
/// removed again.
pub fn stage_split(ctx: &RunContext, layout: &SplitLayout, opts: &PipelineOptions) -> SplitReport {
    match preflight(layout) {
        Ok(entries) => stage_entries(ctx, layout, opts, &entries),
        Err(err) => {
            log::error!("{}", err);
            let mut report = SplitReport::new(layout.name.as_str());
            report.error = Some(err.to_string());
            report
        }
    }
}

fn stage_entries(
    ctx: &RunContext,
    layout: &SplitLayout,
    opts: &PipelineOptions,
    entries: &[SplitEntry],
) -> SplitReport {
    let mut report = SplitReport::new(layout.name.as_str());

    if let Err(source) = fs::create_dir_all(&layout.staging) {
        report.error = Some(format!(
            "cannot create staging directory {}: {}",
            layout.staging.display(),
            source
        ));
        return report;
    }

    log::info!(
        "filtering {} file(s) from {} into {}",
        entries.len(),
        layout.live.display(),
        layout.staging.display()
    );

    let staged: Vec<Result<StagedEntry, FileFailure>> = if opts.parallel {
        entries
            .par_iter()
            .map(|entry| stage_entry(ctx, layout, entry, opts.output_policy))
            .collect()
    } else {
        entries
            .iter()
            .map(|entry| stage_entry(ctx, layout, entry, opts.output_policy))
            .collect()
    };

    for result in staged {
        match result {
            Ok(StagedEntry::Filtered(file)) => report.files.push(file),
            Ok(StagedEntry::Copied) => report.copied_files += 1,
            Err(failure) => report.failures.push(failure),
        }
    }
    report.totals = report.files.iter().map(|file| file.stats).sum();

    if !report.failures.is_empty() {
        log::error!(
            "{} file(s) in split '{}' failed; skipping swap",
            report.failures.len(),
            layout.name
        );
        remove_staging(layout);
        report.outcome = SplitOutcome::SkippedFileErrors;
        return report;
    }

    report.outcome = SplitOutcome::Staged;
    report
}

/// Swap a staged split into place and validate the live result.
///
/// Does nothing unless `report` comes from a successful [`stage_split`].
/// Validation only starts after every staged file is complete.
pub fn promote_split(
    ctx: &RunContext,
    layout: &SplitLayout,
    opts: &PipelineOptions,
    report: &mut SplitReport,
) {
    if report.outcome != SplitOutcome::Staged {
        return;
    }

    if let Err(err) = swap(layout) {
        log::error!("{}", err);
        if layout.live.is_dir() && !layout.backup.exists() {
            remove_staging(layout);
        }
        report.error = Some(err.to_string());
        report.outcome = SplitOutcome::SwapFailed;
        return;
    }
    log::info!(
        "swapped {} into place; original kept at {}",
        layout.live.display(),
        layout.backup.display()
    );

    let validation = match validate_split(&layout.live, ctx.class_count()) {
        Ok(validation) => validation,
        Err(err) => {
            report.error = Some(format!("validation could not run: {}", err));
            report.outcome = integrity_failure(layout, opts);
            return;
        }
    };

    if validation.is_ok() {
        report.outcome = SplitOutcome::Swapped;
    } else {
        log::error!(
            "INTEGRITY VIOLATION in split '{}': {} error(s) in live data",
            layout.name,
            validation.error_count()
        );
        for issue in validation.issues.iter().take(MAX_LOGGED_ISSUES) {
            log::error!("  {}", issue);
        }
        report.outcome = integrity_failure(layout, opts);
    }
    report.validation = Some(validation);
}

/// Move a bad live split aside and restore its backup.
///
/// The live directory goes to the `rejected_` name so it can be inspected.
pub fn rollback_split(layout: &SplitLayout) -> Result<(), LabelsiftError> {
    let failed = |message: String| LabelsiftError::RollbackFailed {
        split: layout.name.clone(),
        message,
    };

    if !layout.backup.is_dir() {
        return Err(failed(format!(
            "backup directory {} does not exist",
            layout.backup.display()
        )));
    }

    if layout.live.exists() {
        if layout.rejected.exists() {
            return Err(failed(format!(
                "{} already exists; remove it first",
                layout.rejected.display()
            )));
        }
        fs::rename(&layout.live, &layout.rejected).map_err(|err| {
            failed(format!(
                "cannot move {} aside: {}",
                layout.live.display(),
                err
            ))
        })?;
    }

    fs::rename(&layout.backup, &layout.live).map_err(|err| {
        failed(format!(
            "cannot restore {}: {}",
            layout.backup.display(),
            err
        ))
    })?;

    log::info!(
        "restored {} from {}",
        layout.live.display(),
        layout.backup.display()
    );
    Ok(())
}

enum StagedEntry {
    Filtered(FileReport),
    Copied,
}

fn preflight(layout: &SplitLayout) -> Result<Vec<SplitEntry>, LabelsiftError> {
    let refuse = |message: String| LabelsiftError::SplitPreflight {
        split: layout.name.clone(),
        message,
    };

    if !layout.live.is_dir() {
        return Err(refuse(format!(
            "{} is not a directory",
            layout.live.display()
        )));
    }
    if layout.backup.exists() {
        return Err(refuse(format!(
            "backup {} already exists from an earlier run",
            layout.backup.display()
        )));
    }
    if layout.staging.exists() {
        return Err(refuse(format!(
            "staging directory {} already exists; an earlier run did not finish",
            layout.staging.display()
        )));
    }

    collect_split_entries(&layout.live)
}

fn stage_entry(
    ctx: &RunContext,
    layout: &SplitLayout,
    entry: &SplitEntry,
    policy: OutputPolicy,
) -> Result<StagedEntry, FileFailure> {
    let failure = |err: &dyn std::fmt::Display| FileFailure {
        path: entry.rel.clone(),
        error: err.to_string(),
    };

    let output = layout.staging.join(&entry.rel_path);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|err| failure(&err))?;
    }

    if !entry.is_annotation {
        fs::copy(&entry.path, &output).map_err(|err| failure(&err))?;
        log::debug!("copied {} unchanged", entry.rel);
        return Ok(StagedEntry::Copied);
    }

    let processed = process_file(&entry.path, &output, ctx.index_map(), policy).map_err(|err| {
        log::error!("{}", err);
        failure(&err)
    })?;

    Ok(StagedEntry::Filtered(FileReport {
        path: entry.rel.clone(),
        stats: processed.stats,
        disposition: processed.disposition,
    }))
}

fn swap(layout: &SplitLayout) -> Result<(), LabelsiftError> {
    swap_with(layout, |from, to| fs::rename(from, to))
}

fn swap_with<R>(layout: &SplitLayout, rename: R) -> Result<(), LabelsiftError>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    rename(&layout.live, &layout.backup).map_err(|source| LabelsiftError::SwapFailed {
        split: layout.name.clone(),
        source,
    })?;

    if let Err(source) = rename(&layout.staging, &layout.live) {
        if let Err(undo) = rename(&layout.backup, &layout.live) {
            log::error!(
                "could not move {} back to {}: {}",
                layout.backup.display(),
                layout.live.display(),
                undo
            );
        }
        return Err(LabelsiftError::SwapFailed {
            split: layout.name.clone(),
            source,
        });
    }

    Ok(())
}

fn integrity_failure(layout: &SplitLayout, opts: &PipelineOptions) -> SplitOutcome {
    if !opts.auto_rollback {
        log::error!(
            "live split {} is invalid; restore it from {} (labelsift rollback)",
            layout.live.display(),
            layout.backup.display()
        );
        return SplitOutcome::IntegrityViolation { rolled_back: false };
    }

    match rollback_split(layout) {
        Ok(()) => SplitOutcome::IntegrityViolation { rolled_back: true },
        Err(err) => {
            log::error!("{}", err);
            SplitOutcome::IntegrityViolation { rolled_back: false }
        }
    }
}

fn remove_staging(layout: &SplitLayout) {
    if let Err(err) = fs::remove_dir_all(&layout.staging) {
        log::warn!(
            "could not remove staging directory {}: {}",
            layout.staging.display(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::catalog::coco80;
    use crate::selection::IndexSelector;

    fn context(indices: &[usize]) -> RunContext {
        let selector = IndexSelector {
            indices: indices.to_vec(),
            names: None,
        };
        RunContext::from_selector(coco80(), &selector).expect("build context")
    }

    fn write_split(root: &Path, split: &str, files: &[(&str, &str)]) {
        let dir = root.join(split);
        fs::create_dir_all(&dir).expect("create split dir");
        for (name, content) in files {
            fs::write(dir.join(name), content).expect("write label");
        }
    }

    #[test]
    fn split_is_swapped_and_backup_kept() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(
            temp.path(),
            "train",
            &[("a.txt", "0 0.1 0.1 0.1 0.1\n7 0.2 0.2 0.2 0.2\n5 0.3 0.3 0.3 0.3\n")],
        );
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");

        let report = process_split(&context(&[0, 7]), &layout, &PipelineOptions::default());

        assert_eq!(report.outcome, SplitOutcome::Swapped);
        assert_eq!(report.totals.kept, 2);
        assert_eq!(report.totals.dropped, 1);
        assert_eq!(
            fs::read_to_string(layout.live.join("a.txt")).expect("read live"),
            "0 0.1 0.1 0.1 0.1\n1 0.2 0.2 0.2 0.2\n"
        );
        assert_eq!(
            fs::read_to_string(layout.backup.join("a.txt")).expect("read backup"),
            "0 0.1 0.1 0.1 0.1\n7 0.2 0.2 0.2 0.2\n5 0.3 0.3 0.3 0.3\n"
        );
        assert!(!layout.staging.exists());
        assert!(report.validation.as_ref().is_some_and(|v| v.is_ok()));
    }

    #[test]
    fn non_label_files_survive_the_swap() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(
            temp.path(),
            "val",
            &[("a.txt", "3 0.1 0.1 0.1 0.1\n"), ("notes.json", "{\"k\": 1}")],
        );
        let layout = SplitLayout::new(temp.path(), "val").expect("layout");

        let report = process_split(&context(&[3]), &layout, &PipelineOptions::default());

        assert_eq!(report.outcome, SplitOutcome::Swapped);
        assert_eq!(report.copied_files, 1);
        assert_eq!(
            fs::read_to_string(layout.live.join("notes.json")).expect("read notes"),
            "{\"k\": 1}"
        );
    }

    #[test]
    fn existing_backup_blocks_the_split() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[("a.txt", "0 0.1 0.1 0.1 0.1\n")]);
        fs::create_dir_all(temp.path().join("original_train")).expect("create backup");
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");

        let report = process_split(&context(&[0]), &layout, &PipelineOptions::default());

        assert_eq!(report.outcome, SplitOutcome::PreflightFailed);
        assert!(report.error.is_some());
        assert!(!layout.staging.exists());
        assert!(layout.live.join("a.txt").is_file());
    }

    #[test]
    fn missing_split_fails_preflight() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = SplitLayout::new(temp.path(), "test").expect("layout");
        let report = process_split(&context(&[0]), &layout, &PipelineOptions::default());
        assert_eq!(report.outcome, SplitOutcome::PreflightFailed);
    }

    #[test]
    fn parallel_processing_matches_sequential() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let files: Vec<(String, String)> = (0..16)
            .map(|i| {
                (
                    format!("img_{i:02}.txt"),
                    format!("{} 0.1 0.1 0.1 0.1\n{} 0.2 0.2 0.2 0.2\n", i % 4, (i + 5) % 9),
                )
            })
            .collect();
        let borrowed: Vec<(&str, &str)> = files
            .iter()
            .map(|(n, c)| (n.as_str(), c.as_str()))
            .collect();
        write_split(temp.path(), "seq", &borrowed);
        write_split(temp.path(), "par", &borrowed);
        let ctx = context(&[0, 2, 7]);

        let seq = process_split(
            &ctx,
            &SplitLayout::new(temp.path(), "seq").expect("layout"),
            &PipelineOptions::default(),
        );
        let par = process_split(
            &ctx,
            &SplitLayout::new(temp.path(), "par").expect("layout"),
            &PipelineOptions {
                parallel: true,
                ..Default::default()
            },
        );

        assert_eq!(seq.outcome, SplitOutcome::Swapped);
        assert_eq!(par.outcome, SplitOutcome::Swapped);
        assert_eq!(seq.totals, par.totals);
        assert_eq!(seq.files, par.files);
        for (name, _) in &files {
            assert_eq!(
                fs::read(temp.path().join("seq").join(name)).expect("read seq"),
                fs::read(temp.path().join("par").join(name)).expect("read par"),
            );
        }
    }

    #[test]
    fn corrupted_staging_is_caught_after_swap() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[("a.txt", "0 0.1 0.1 0.1 0.1\n")]);
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");
        let ctx = context(&[0]);
        let opts = PipelineOptions::default();

        let mut report = stage_split(&ctx, &layout, &opts);
        assert_eq!(report.outcome, SplitOutcome::Staged);
        fs::write(layout.staging.join("a.txt"), "12 0.1 0.1 0.1 0.1\n").expect("corrupt");

        promote_split(&ctx, &layout, &opts, &mut report);

        assert_eq!(
            report.outcome,
            SplitOutcome::IntegrityViolation { rolled_back: false }
        );
        let validation = report.validation.as_ref().expect("validation ran");
        assert_eq!(validation.error_count(), 1);
        assert!(layout.backup.join("a.txt").is_file());
    }

    #[test]
    fn auto_rollback_restores_original_on_violation() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[("a.txt", "0 0.1 0.1 0.1 0.1\n")]);
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");
        let ctx = context(&[0]);
        let opts = PipelineOptions {
            auto_rollback: true,
            ..Default::default()
        };

        let mut report = stage_split(&ctx, &layout, &opts);
        fs::write(layout.staging.join("a.txt"), "3 0.1 0.1 0.1 0.1\n").expect("corrupt");
        promote_split(&ctx, &layout, &opts, &mut report);

        assert_eq!(
            report.outcome,
            SplitOutcome::IntegrityViolation { rolled_back: true }
        );
        assert_eq!(
            fs::read_to_string(layout.live.join("a.txt")).expect("read live"),
            "0 0.1 0.1 0.1 0.1\n"
        );
        assert!(layout.rejected.join("a.txt").is_file());
        assert!(!layout.backup.exists());
    }

    #[test]
    fn file_failure_skips_swap_and_other_splits_continue() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[("a.txt", "0 0.1 0.1 0.1 0.1\n7 x\n")]);
        write_split(temp.path(), "val", &[("b.txt", "7 0.2 0.2 0.2 0.2\n")]);
        let ctx = context(&[0, 7]);
        let opts = PipelineOptions::default();

        let train = SplitLayout::new(temp.path(), "train").expect("layout");
        let mut entries = collect_split_entries(&train.live).expect("collect");
        entries.push(SplitEntry {
            path: train.live.join("vanished.txt"),
            rel_path: PathBuf::from("vanished.txt"),
            rel: "vanished.txt".to_string(),
            is_annotation: true,
        });

        let mut report = stage_entries(&ctx, &train, &opts, &entries);
        promote_split(&ctx, &train, &opts, &mut report);

        assert_eq!(report.outcome, SplitOutcome::SkippedFileErrors);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "vanished.txt");
        assert!(!train.staging.exists());
        assert!(!train.backup.exists());
        assert_eq!(
            fs::read_to_string(train.live.join("a.txt")).expect("read live"),
            "0 0.1 0.1 0.1 0.1\n7 x\n"
        );

        let val = SplitLayout::new(temp.path(), "val").expect("layout");
        let val_report = process_split(&ctx, &val, &opts);
        assert_eq!(val_report.outcome, SplitOutcome::Swapped);
        assert_eq!(
            fs::read_to_string(val.live.join("b.txt")).expect("read live"),
            "1 0.2 0.2 0.2 0.2\n"
        );
    }

    #[test]
    fn failed_staging_rename_restores_live_split() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[("a.txt", "0 0.1 0.1 0.1 0.1\n")]);
        write_split(temp.path(), "filter_train", &[("a.txt", "0 staged\n")]);
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");

        let err = swap_with(&layout, |from, to| {
            if from == layout.staging.as_path() {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            } else {
                fs::rename(from, to)
            }
        })
        .unwrap_err();

        assert!(matches!(err, LabelsiftError::SwapFailed { .. }));
        assert_eq!(
            fs::read_to_string(layout.live.join("a.txt")).expect("read live"),
            "0 0.1 0.1 0.1 0.1\n"
        );
        assert!(!layout.backup.exists());
        assert!(layout.staging.join("a.txt").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_file_names_survive_the_swap() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[]);
        let name = OsStr::from_bytes(b"img_\xff.txt");
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");
        if fs::write(layout.live.join(name), "0 0.1 0.1 0.1 0.1\n").is_err() {
            // Filesystem refuses non-UTF-8 names.
            return;
        }

        let report = process_split(&context(&[0]), &layout, &PipelineOptions::default());

        assert_eq!(report.outcome, SplitOutcome::Swapped);
        assert!(layout.live.join(name).is_file());
        assert_eq!(fs::read_dir(&layout.live).expect("read live").count(), 1);
    }

    #[test]
    fn rollback_restores_backup_and_keeps_rejected() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[("a.txt", "9 bad\n")]);
        write_split(temp.path(), "original_train", &[("a.txt", "0 good\n")]);
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");

        rollback_split(&layout).expect("rollback");

        assert_eq!(
            fs::read_to_string(layout.live.join("a.txt")).expect("read live"),
            "0 good\n"
        );
        assert_eq!(
            fs::read_to_string(layout.rejected.join("a.txt")).expect("read rejected"),
            "9 bad\n"
        );
        assert!(!layout.backup.exists());
    }

    #[test]
    fn rollback_without_backup_fails() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_split(temp.path(), "train", &[("a.txt", "0 x\n")]);
        let layout = SplitLayout::new(temp.path(), "train").expect("layout");

        let err = rollback_split(&layout).unwrap_err();
        assert!(matches!(err, LabelsiftError::RollbackFailed { .. }));
        assert!(layout.live.join("a.txt").is_file());
    }
}
