//! Per-line and per-file class filtering.
//!
//! [`transform_line`] classifies one label line against a [`ClassIndexMap`];
//! [`process_file`] streams a whole label file through it into a staging
//! location. Only the leading class token of a kept line is rewritten: the
//! indentation, payload tokens, spacing and line terminator pass through
//! byte-for-byte.

mod report;

pub use report::{OutputDisposition, ProcessedFile, ProcessingStats};

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::LabelsiftError;
use crate::remap::ClassIndexMap;

/// Whether unchanged files are re-serialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Write every output file from the transformed lines.
    #[default]
    Always,
    /// Copy files whose output would equal their input instead of writing them.
    SkipUnchanged,
}

/// Classification of a single label line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome<'a> {
    /// The class is retained; the line is rewritten.
    Kept(KeptLine<'a>),
    /// The class parsed but is not retained.
    Dropped { class_index: i64 },
    /// No integer class index could be read (blank line, text, bad UTF-8).
    Malformed,
}

/// A retained line, split around its class token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeptLine<'a> {
    /// Whitespace before the class token.
    pub indent: &'a str,
    pub original: usize,
    pub new: usize,
    /// Everything after the class token, terminator included.
    pub rest: &'a str,
}

impl KeptLine<'_> {
    pub fn is_remapped(&self) -> bool {
        self.original != self.new
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.indent.as_bytes())?;
        write!(out, "{}", self.new)?;
        out.write_all(self.rest.as_bytes())
    }

    /// The rewritten line as a string.
    pub fn render(&self) -> String {
        format!("{}{}{}", self.indent, self.new, self.rest)
    }
}

/// Classify one line (with or without its terminator) against the map.
pub fn transform_line<'a>(line: &'a str, map: &ClassIndexMap) -> LineOutcome<'a> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let token_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let (token, rest) = body.split_at(token_end);

    if token.is_empty() {
        return LineOutcome::Malformed;
    }
    let Ok(class_index) = token.parse::<i64>() else {
        return LineOutcome::Malformed;
    };

    let mapped = usize::try_from(class_index)
        .ok()
        .and_then(|original| map.get(original).map(|new| (original, new)));

    match mapped {
        Some((original, new)) => LineOutcome::Kept(KeptLine {
            indent,
            original,
            new,
            rest,
        }),
        None => LineOutcome::Dropped { class_index },
    }
}

/// Filter `input` into `output`.
///
/// The output is assembled in a `.part` sibling and renamed into place only
/// after the whole input has been read; on failure the partial file is
/// removed, so `output` either holds a complete result or does not exist.
pub fn process_file(
    input: &Path,
    output: &Path,
    map: &ClassIndexMap,
    policy: OutputPolicy,
) -> Result<ProcessedFile, LabelsiftError> {
    let part = part_path(output);

    let stats = match stream_file(input, &part, map) {
        Ok(stats) => stats,
        Err(err) => {
            discard(&part);
            return Err(err);
        }
    };

    let disposition = if policy == OutputPolicy::SkipUnchanged && stats.is_unchanged() {
        discard(&part);
        fs::copy(input, output).map_err(|source| {
            discard(output);
            LabelsiftError::FileIoFailure {
                path: output.to_path_buf(),
                source,
            }
        })?;
        OutputDisposition::CopiedUnchanged
    } else {
        fs::rename(&part, output).map_err(|source| {
            discard(&part);
            LabelsiftError::FileIoFailure {
                path: output.to_path_buf(),
                source,
            }
        })?;
        OutputDisposition::Written
    };

    log::debug!(
        "{} -> {}: {}",
        input.display(),
        output.display(),
        stats
    );

    Ok(ProcessedFile { stats, disposition })
}

fn stream_file(
    input: &Path,
    part: &Path,
    map: &ClassIndexMap,
) -> Result<ProcessingStats, LabelsiftError> {
    let read_err = |source| LabelsiftError::FileIoFailure {
        path: input.to_path_buf(),
        source,
    };
    let write_err = |source| LabelsiftError::FileIoFailure {
        path: part.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(input).map_err(read_err)?);
    let mut writer = BufWriter::new(File::create(part).map_err(write_err)?);

    let mut stats = ProcessingStats::default();
    let mut buf = Vec::new();
    let mut line_num = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).map_err(read_err)? == 0 {
            break;
        }
        line_num += 1;

        let outcome = match std::str::from_utf8(&buf) {
            Ok(line) => transform_line(line, map),
            Err(_) => LineOutcome::Malformed,
        };

        match outcome {
            LineOutcome::Kept(kept) => {
                kept.write_to(&mut writer).map_err(write_err)?;
                stats.kept += 1;
                if kept.is_remapped() {
                    stats.remapped += 1;
                    log::trace!(
                        "{}:{}: class {} -> {}",
                        input.display(),
                        line_num,
                        kept.original,
                        kept.new
                    );
                }
            }
            LineOutcome::Dropped { class_index } => {
                stats.dropped += 1;
                log::trace!(
                    "{}:{}: dropped class {}",
                    input.display(),
                    line_num,
                    class_index
                );
            }
            LineOutcome::Malformed => {
                stats.malformed += 1;
                log::trace!(
                    "{}:{}: malformed line {:?}",
                    input.display(),
                    line_num,
                    String::from_utf8_lossy(&buf).trim_end()
                );
            }
        }
    }

    let file = writer
        .into_inner()
        .map_err(|err| write_err(err.into_error()))?;
    file.sync_all().map_err(write_err)?;

    Ok(stats)
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("could not remove {}: {}", path.display(), err);
        }
    }
}

/// Fuzz-only entrypoint for line classification.
#[cfg(feature = "fuzzing")]
pub fn fuzz_transform_line(input: &str) -> bool {
    let retained = (0..10).step_by(2).collect();
    let Ok(map) = ClassIndexMap::new(&retained) else {
        return false;
    };
    matches!(transform_line(input, &map), LineOutcome::Kept(_))
}
