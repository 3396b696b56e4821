//! Post-swap integrity validation.
//!
//! After a split has been swapped into place, every line of every label file
//! is re-read and its class index checked against the new class count. Any
//! error here means unprocessed or corrupted content reached the live split.

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::LabelsiftError;
use crate::layout::{collect_annotation_files, rel_string};

/// Check that every class index under `dir` lies in `0..class_count`.
///
/// Fails only when the directory itself cannot be traversed; per-file and
/// per-line problems are collected into the report.
pub fn validate_split(dir: &Path, class_count: usize) -> Result<ValidationReport, LabelsiftError> {
    let mut report = ValidationReport::new();
    let files = collect_annotation_files(dir)?;

    if files.is_empty() {
        report.add(ValidationIssue::warning(
            IssueCode::NoAnnotationFiles,
            "no annotation files found",
            IssueContext::Split {
                path: dir.display().to_string(),
            },
        ));
    }

    for path in &files {
        let rel = rel_string(dir, path);
        report.files_checked += 1;
        validate_file(path, &rel, class_count, &mut report);
    }

    Ok(report)
}

fn validate_file(path: &Path, rel: &str, class_count: usize, report: &mut ValidationReport) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            report.add(ValidationIssue::error(
                IssueCode::UnreadableFile,
                format!("cannot open: {}", err),
                IssueContext::File {
                    path: rel.to_string(),
                },
            ));
            return;
        }
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut line_num = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                report.add(ValidationIssue::error(
                    IssueCode::UnreadableFile,
                    format!("read failed after line {}: {}", line_num, err),
                    IssueContext::File {
                        path: rel.to_string(),
                    },
                ));
                return;
            }
        }
        line_num += 1;
        report.lines_checked += 1;

        let context = || IssueContext::Line {
            path: rel.to_string(),
            line: line_num,
        };

        let token = std::str::from_utf8(&buf)
            .ok()
            .and_then(|line| line.split_whitespace().next());
        let Some(token) = token else {
            report.add(ValidationIssue::error(
                IssueCode::UnparseableClassIndex,
                "line has no class index",
                context(),
            ));
            continue;
        };

        match token.parse::<i64>() {
            Ok(index) if index >= 0 && (index as u64) < class_count as u64 => {}
            Ok(index) => report.add(ValidationIssue::error(
                IssueCode::ClassIndexOutOfRange,
                format!(
                    "class index {} outside valid range 0..={}",
                    index,
                    class_count.saturating_sub(1)
                ),
                context(),
            )),
            Err(_) => report.add(ValidationIssue::error(
                IssueCode::UnparseableClassIndex,
                format!("invalid class index '{}'", token),
                context(),
            )),
        }
    }
}
