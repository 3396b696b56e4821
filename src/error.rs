use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for labelsift operations.
#[derive(Debug, Error)]
pub enum LabelsiftError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No classes selected: the retained set must contain at least one class")]
    EmptySelection,

    #[error("Class index {index} is out of range for a catalog of {catalog_len} class(es)")]
    UnknownClassIndex { index: usize, catalog_len: usize },

    #[error("Class name '{name}' is not present in the class catalog")]
    UnknownClassName { name: String },

    #[error("Selection mismatch: {message}")]
    SelectionMismatch { message: String },

    #[error("Failed to read class catalog from {path}: {message}")]
    CatalogInvalid { path: PathBuf, message: String },

    #[error("Failed to process {path}: {source}")]
    FileIoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Split '{split}' cannot be processed: {message}")]
    SplitPreflight { split: String, message: String },

    #[error("Failed to swap split '{split}' into place: {source}")]
    SwapFailed {
        split: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to roll back split '{split}': {message}")]
    RollbackFailed { split: String, message: String },

    #[error(
        "Integrity violation in split '{split}': {error_count} error(s); restore from the backup directory"
    )]
    IntegrityViolation {
        split: String,
        error_count: usize,
        report: ValidationReport,
    },

    #[error("Dataset config not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Dataset config is not readable: {path}: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dataset config {path} has no '{field}' field")]
    ConfigFieldMissing { path: PathBuf, field: &'static str },

    #[error("Failed to parse dataset config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Config backup {path} already exists from an earlier run; remove it first")]
    ConfigBackupExists { path: PathBuf },

    #[error("Failed to write dataset config {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Run failed: {message}")]
    RunFailed { message: String },
}
