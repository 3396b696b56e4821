//! Line counters collected while filtering annotation files.

use serde::Serialize;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Per-file line counters.
///
/// Counters only ever grow and are merged by summation, so aggregating file
/// stats into split stats gives the same result in any order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Lines written to the output (with their class index remapped).
    pub kept: usize,
    /// Lines whose class is not retained.
    pub dropped: usize,
    /// Lines without a parseable integer class index.
    pub malformed: usize,
    /// Kept lines whose class index changed value.
    pub remapped: usize,
}

impl ProcessingStats {
    /// Total number of input lines seen.
    pub fn total_lines(&self) -> usize {
        self.kept + self.dropped + self.malformed
    }

    /// True when the output is byte-identical to the input.
    pub fn is_unchanged(&self) -> bool {
        self.dropped == 0 && self.malformed == 0 && self.remapped == 0
    }
}

impl Add for ProcessingStats {
    type Output = ProcessingStats;

    fn add(self, rhs: Self) -> Self::Output {
        ProcessingStats {
            kept: self.kept + rhs.kept,
            dropped: self.dropped + rhs.dropped,
            malformed: self.malformed + rhs.malformed,
            remapped: self.remapped + rhs.remapped,
        }
    }
}

impl AddAssign for ProcessingStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for ProcessingStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ProcessingStats::default(), Add::add)
    }
}

impl<'a> Sum<&'a ProcessingStats> for ProcessingStats {
    fn sum<I: Iterator<Item = &'a ProcessingStats>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for ProcessingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept={} dropped={} malformed={} (remapped={})",
            self.kept, self.dropped, self.malformed, self.remapped
        )
    }
}

/// How a file's output reached the staging directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDisposition {
    /// The transformed lines were written.
    Written,
    /// Nothing changed and the input was copied verbatim.
    CopiedUnchanged,
}

/// Result of processing one annotation file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessedFile {
    pub stats: ProcessingStats,
    pub disposition: OutputDisposition,
}
