//! Dataset split directory layout and file discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::LabelsiftError;

/// Extension of YOLO label files.
pub const LABEL_EXTENSION: &str = "txt";

const STAGING_PREFIX: &str = "filter_";
const BACKUP_PREFIX: &str = "original_";
const REJECTED_PREFIX: &str = "rejected_";

/// The directories involved in processing one split.
///
/// For a split `train2017` under `root`:
/// - live: `root/train2017`
/// - staging: `root/filter_train2017`
/// - backup: `root/original_train2017`
/// - rejected: `root/rejected_train2017` (a live split moved aside on rollback)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitLayout {
    pub name: String,
    pub live: PathBuf,
    pub staging: PathBuf,
    pub backup: PathBuf,
    pub rejected: PathBuf,
}

impl SplitLayout {
    pub fn new(root: &Path, split: &str) -> Result<Self, LabelsiftError> {
        let is_plain_name = !split.is_empty()
            && Path::new(split).file_name().and_then(|n| n.to_str()) == Some(split);
        if !is_plain_name {
            return Err(LabelsiftError::InvalidArgument(format!(
                "split '{}' must be a single directory name",
                split
            )));
        }

        Ok(Self {
            name: split.to_string(),
            live: root.join(split),
            staging: root.join(format!("{STAGING_PREFIX}{split}")),
            backup: root.join(format!("{BACKUP_PREFIX}{split}")),
            rejected: root.join(format!("{REJECTED_PREFIX}{split}")),
        })
    }
}

/// A file found under a split directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitEntry {
    pub path: PathBuf,
    /// Path relative to the split directory, byte-exact.
    pub rel_path: PathBuf,
    /// `rel_path` as a `/`-separated string, for reports.
    pub rel: String,
    /// Whether the file is a label file to be filtered.
    pub is_annotation: bool,
}

/// Every regular file under `dir`, sorted by relative path.
pub fn collect_split_entries(dir: &Path) -> Result<Vec<SplitEntry>, LabelsiftError> {
    if !dir.is_dir() {
        return Err(LabelsiftError::SplitPreflight {
            split: dir.display().to_string(),
            message: "directory does not exist".to_string(),
        });
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|source| LabelsiftError::SplitPreflight {
            split: dir.display().to_string(),
            message: format!("failed while traversing directory: {source}"),
        })?;

        if entry.file_type().is_file() {
            let path = entry.path().to_path_buf();
            let rel_path = path.strip_prefix(dir).unwrap_or(&path).to_path_buf();
            entries.push(SplitEntry {
                rel: rel_string(dir, &path),
                rel_path,
                is_annotation: has_extension(&path, &[LABEL_EXTENSION]),
                path,
            });
        }
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

/// Label files under `dir`, sorted by relative path.
pub fn collect_annotation_files(dir: &Path) -> Result<Vec<PathBuf>, LabelsiftError> {
    Ok(collect_split_entries(dir)?
        .into_iter()
        .filter(|entry| entry.is_annotation)
        .map(|entry| entry.path)
        .collect())
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

pub fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}
