//! Dataset config rewriting.
//!
//! The config (an Ultralytics-style `data.yaml`/`coco.yaml`) is edited line
//! by line rather than re-serialized, so comments, key order and every field
//! other than `nc` and `names` survive untouched. A byte-for-byte `.bak` copy
//! is written before the file is modified.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::LabelsiftError;
use crate::remap::RunContext;

const COUNT_KEY: &str = "nc:";
const NAMES_KEY: &str = "names:";

/// What happens to config lines after the `names` field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPolicy {
    /// Keep every line after the names field unchanged.
    #[default]
    PreserveTrailing,
    /// Drop everything after the names field.
    TruncateAfterNames,
}

/// Options for the config rewrite.
#[derive(Clone, Debug, Default)]
pub struct RewriteOptions {
    pub trailing: TrailingPolicy,
}

/// Outcome of a successful config rewrite.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigRewriteReport {
    pub path: String,
    pub backup: String,
    pub class_count: usize,
    pub names: Vec<String>,
    /// Whether an `nc:` line was present and rewritten.
    pub count_field_found: bool,
    pub trailing: TrailingPolicy,
    /// Lines discarded by [`TrailingPolicy::TruncateAfterNames`].
    pub truncated_lines: usize,
}

impl fmt::Display for ConfigRewriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Config {}: PASS (nc: {}, {} name(s); backup at {})",
            self.path,
            self.class_count,
            self.names.len(),
            self.backup
        )?;
        if !self.count_field_found {
            writeln!(f, "  [WARN ] no '{}' line found; only names were rewritten", COUNT_KEY)?;
        }
        if self.truncated_lines > 0 {
            writeln!(
                f,
                "  {} line(s) after the names field were dropped",
                self.truncated_lines
            )?;
        }
        Ok(())
    }
}

/// The `.bak` sibling of a config file (`coco.yaml` -> `coco.yaml.bak`).
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Rewrite `nc` and `names` in the config at `path` for the run's selection.
///
/// Nothing is written when the file is missing, unreadable, has no names
/// field or already has a `.bak` sibling. Otherwise the backup is written
/// first, then the config itself.
pub fn rewrite_dataset_config(
    path: &Path,
    ctx: &RunContext,
    opts: &RewriteOptions,
) -> Result<ConfigRewriteReport, LabelsiftError> {
    if !path.exists() {
        return Err(LabelsiftError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }

    let backup = backup_path(path);
    if backup.exists() {
        return Err(LabelsiftError::ConfigBackupExists { path: backup });
    }

    let unreadable = |source| LabelsiftError::ConfigUnreadable {
        path: path.to_path_buf(),
        source,
    };
    let original = fs::read(path).map_err(unreadable)?;
    let text = std::str::from_utf8(&original)
        .map_err(|err| unreadable(io::Error::new(io::ErrorKind::InvalidData, err)))?;

    let rewritten = rewrite_config_text(text, ctx.class_count(), ctx.retained_names(), opts.trailing)
        .ok_or_else(|| LabelsiftError::ConfigFieldMissing {
            path: path.to_path_buf(),
            field: "names",
        })?;

    write_backup(&backup, &original)?;
    log::info!("backed up {} to {}", path.display(), backup.display());

    fs::write(path, rewritten.text.as_bytes()).map_err(|source| LabelsiftError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "rewrote {} for {} class(es)",
        path.display(),
        ctx.class_count()
    );

    Ok(ConfigRewriteReport {
        path: path.display().to_string(),
        backup: backup.display().to_string(),
        class_count: ctx.class_count(),
        names: ctx.retained_names().to_vec(),
        count_field_found: rewritten.count_field_found,
        trailing: opts.trailing,
        truncated_lines: rewritten.truncated_lines,
    })
}

// `create_new` so a backup from an earlier run is never replaced.
fn write_backup(backup: &Path, contents: &[u8]) -> Result<(), LabelsiftError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(backup) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(LabelsiftError::ConfigBackupExists {
                path: backup.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(LabelsiftError::ConfigWrite {
                path: backup.to_path_buf(),
                source,
            })
        }
    };
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|source| LabelsiftError::ConfigWrite {
            path: backup.to_path_buf(),
            source,
        })
}

/// Copy the `.bak` sibling back over the config.
pub fn restore_config(path: &Path) -> Result<(), LabelsiftError> {
    let backup = backup_path(path);
    if !backup.is_file() {
        return Err(LabelsiftError::ConfigNotFound { path: backup });
    }
    fs::copy(&backup, path).map_err(|source| LabelsiftError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("restored {} from {}", path.display(), backup.display());
    Ok(())
}

/// Result of rewriting config text in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewrittenConfig {
    pub text: String,
    pub count_field_found: bool,
    pub truncated_lines: usize,
}

/// Rewrite the `nc` and `names` fields of config text.
///
/// Returns `None` when there is no top-level `names:` line. A names field in
/// block form (indented or `- ` lines below it) or as a flow list spanning
/// several lines is replaced as a whole by a single flow line.
pub fn rewrite_config_text(
    text: &str,
    class_count: usize,
    names: &[String],
    trailing: TrailingPolicy,
) -> Option<RewrittenConfig> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = String::with_capacity(text.len());
    let mut count_field_found = false;
    let mut names_found = false;
    let mut truncated_lines = 0;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let (content, ending) = split_line_ending(line);

        if content.starts_with(COUNT_KEY) {
            out.push_str(&format!("{} {}", COUNT_KEY, class_count));
            out.push_str(ending);
            count_field_found = true;
            i += 1;
        } else if !names_found && content.starts_with(NAMES_KEY) {
            names_found = true;
            out.push_str(&format_names_line(names));
            out.push_str(ending);
            i += 1 + names_continuation(&content[NAMES_KEY.len()..], &lines[i + 1..]);

            if trailing == TrailingPolicy::TruncateAfterNames {
                truncated_lines = lines.len() - i;
                break;
            }
        } else {
            out.push_str(line);
            i += 1;
        }
    }

    names_found.then_some(RewrittenConfig {
        text: out,
        count_field_found,
        truncated_lines,
    })
}

fn format_names_line(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|name| yaml_single_quoted(name)).collect();
    format!("{} [{}]", NAMES_KEY, quoted.join(", "))
}

fn yaml_single_quoted(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

/// Number of lines after the `names:` line that belong to its value.
fn names_continuation(value: &str, following: &[&str]) -> usize {
    let value = value.trim();

    if value.is_empty() || value.starts_with('#') {
        // Block value: indented lines or `- ` items, possibly with blank lines between.
        let mut consumed = 0;
        for (offset, line) in following.iter().enumerate() {
            let (content, _) = split_line_ending(line);
            if content.trim().is_empty() {
                continue;
            }
            if content.starts_with(char::is_whitespace) || content.starts_with('-') {
                consumed = offset + 1;
            } else {
                break;
            }
        }
        return consumed;
    }

    if value.starts_with('[') {
        let mut depth = bracket_balance(value);
        let mut consumed = 0;
        while depth > 0 && consumed < following.len() {
            depth += bracket_balance(following[consumed]);
            consumed += 1;
        }
        return consumed;
    }

    0
}

// Net `[` minus `]` outside quoted scalars.
fn bracket_balance(s: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth -= 1,
            (None, '#') => break,
            _ => {}
        }
    }
    depth
}
