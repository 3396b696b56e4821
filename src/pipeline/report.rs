//! Split and run report types.
//!
//! Reports render as text (Display) for terminals and serialize as JSON for
//! programmatic consumers.

use serde::Serialize;
use std::fmt;

use crate::config::ConfigRewriteReport;
use crate::filter::{OutputDisposition, ProcessingStats};
use crate::validation::ValidationReport;

/// Final status of one split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SplitOutcome {
    /// Every file was filtered into staging; the swap has not happened yet.
    Staged,
    /// Processed output is live and passed validation.
    Swapped,
    /// The split could not be started (missing directory, leftover backup or staging).
    PreflightFailed,
    /// At least one file failed; live data was left untouched.
    SkippedFileErrors,
    /// The directory renames failed.
    SwapFailed,
    /// Validation found invalid content in the live split.
    IntegrityViolation { rolled_back: bool },
}

impl fmt::Display for SplitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitOutcome::Staged => write!(f, "PENDING (staged, not swapped)"),
            SplitOutcome::Swapped => write!(f, "PASS (swapped)"),
            SplitOutcome::PreflightFailed => write!(f, "FAIL (preflight)"),
            SplitOutcome::SkippedFileErrors => write!(f, "FAIL (file errors, swap skipped)"),
            SplitOutcome::SwapFailed => write!(f, "FAIL (swap)"),
            SplitOutcome::IntegrityViolation { rolled_back: true } => {
                write!(f, "FAIL (integrity violation, rolled back)")
            }
            SplitOutcome::IntegrityViolation { rolled_back: false } => {
                write!(f, "FAIL (integrity violation, ROLLBACK REQUIRED)")
            }
        }
    }
}

/// Counters for one processed label file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Path relative to the split directory.
    pub path: String,
    pub stats: ProcessingStats,
    pub disposition: OutputDisposition,
}

/// A file that could not be processed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Everything that happened to one split.
#[derive(Clone, Debug, Serialize)]
pub struct SplitReport {
    pub split: String,
    pub outcome: SplitOutcome,
    /// Sum of all per-file stats.
    pub totals: ProcessingStats,
    pub files: Vec<FileReport>,
    /// Non-label files carried over verbatim.
    pub copied_files: usize,
    pub failures: Vec<FileFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SplitReport {
    pub fn new(split: impl Into<String>) -> Self {
        Self {
            split: split.into(),
            outcome: SplitOutcome::PreflightFailed,
            totals: ProcessingStats::default(),
            files: Vec::new(),
            copied_files: 0,
            failures: Vec::new(),
            validation: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SplitOutcome::Swapped
    }
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Split '{}': {}", self.split, self.outcome)?;
        for file in &self.files {
            writeln!(f, "  {}: {}", file.path, file.stats)?;
        }
        writeln!(
            f,
            "  total: {} file(s), {} line(s): {}",
            self.files.len(),
            self.totals.total_lines(),
            self.totals
        )?;
        if self.copied_files > 0 {
            writeln!(f, "  copied {} non-label file(s) unchanged", self.copied_files)?;
        }
        for failure in &self.failures {
            writeln!(f, "  [ERROR] {}: {}", failure.path, failure.error)?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "  [ERROR] {}", error)?;
        }
        if let Some(validation) = &self.validation {
            for line in validation.to_string().lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        Ok(())
    }
}

/// Status of the dataset config step.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfigStep {
    Rewritten(ConfigRewriteReport),
    Failed { path: String, error: String },
    Skipped { path: String, reason: String },
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigStep::Rewritten(report) => write!(f, "{}", report),
            ConfigStep::Failed { path, error } => {
                writeln!(f, "Config {}: FAIL", path)?;
                writeln!(f, "  [ERROR] {}", error)
            }
            ConfigStep::Skipped { path, reason } => {
                writeln!(f, "Config {}: SKIPPED", path)?;
                writeln!(f, "  {}", reason)
            }
        }
    }
}

/// Report for a whole filter run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    /// Number of classes after filtering.
    pub class_count: usize,
    /// Retained class names in new-index order.
    pub names: Vec<String>,
    /// `(original, new)` class index pairs.
    pub index_map: Vec<(usize, usize)>,
    pub splits: Vec<SplitReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigStep>,
}

impl RunReport {
    pub fn failed_splits(&self) -> usize {
        self.splits.iter().filter(|s| !s.is_success()).count()
    }

    pub fn config_failed(&self) -> bool {
        matches!(self.config, Some(ConfigStep::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.failed_splits() == 0 && !self.config_failed()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .index_map
            .iter()
            .map(|(original, new)| format!("{}->{}", original, new))
            .collect();
        writeln!(f, "Retaining {} class(es): {}", self.class_count, pairs.join(", "))?;
        writeln!(f)?;

        for split in &self.splits {
            write!(f, "{}", split)?;
            writeln!(f)?;
        }

        if let Some(config) = &self.config {
            write!(f, "{}", config)?;
            writeln!(f)?;
        }

        if self.is_success() {
            writeln!(f, "Run succeeded")
        } else {
            writeln!(
                f,
                "Run failed: {} of {} split(s) failed{}",
                self.failed_splits(),
                self.splits.len(),
                if self.config_failed() {
                    ", config rewrite failed"
                } else {
                    ""
                }
            )
        }
    }
}
