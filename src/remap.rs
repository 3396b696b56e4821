//! Deterministic class renumbering and the per-run context.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::LabelsiftError;
use crate::selection::{ClassCatalog, ClassSelector, Selection};

/// Mapping from original class index to a contiguous new index.
///
/// New indices are assigned in ascending order of original index, so the
/// same retained set always yields the same map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassIndexMap {
    map: BTreeMap<usize, usize>,
}

impl ClassIndexMap {
    /// Build the map for a retained set. Fails on an empty set.
    pub fn new(retained: &BTreeSet<usize>) -> Result<Self, LabelsiftError> {
        if retained.is_empty() {
            return Err(LabelsiftError::EmptySelection);
        }
        let map = retained
            .iter()
            .enumerate()
            .map(|(new, &original)| (original, new))
            .collect();
        Ok(Self { map })
    }

    /// New index for `original`, if the class is retained.
    pub fn get(&self, original: usize) -> Option<usize> {
        self.map.get(&original).copied()
    }

    /// Number of retained classes; valid new indices are `0..len()`.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// True when every retained class keeps its index.
    pub fn is_identity(&self) -> bool {
        self.map.iter().all(|(original, new)| original == new)
    }

    /// `(original, new)` pairs in ascending original order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.map.iter().map(|(&original, &new)| (original, new))
    }
}

/// Everything a run needs to know about the chosen classes, built once
/// before any file is touched and passed by reference into each stage.
#[derive(Clone, Debug)]
pub struct RunContext {
    catalog: ClassCatalog,
    selection: Selection,
    index_map: ClassIndexMap,
}

impl RunContext {
    pub fn new(catalog: ClassCatalog, selection: Selection) -> Result<Self, LabelsiftError> {
        let index_map = ClassIndexMap::new(selection.retained())?;
        Ok(Self {
            catalog,
            selection,
            index_map,
        })
    }

    /// Run the selector against the catalog and build the context.
    pub fn from_selector(
        catalog: ClassCatalog,
        selector: &dyn ClassSelector,
    ) -> Result<Self, LabelsiftError> {
        let selection = selector.select(&catalog)?;
        Self::new(catalog, selection)
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn index_map(&self) -> &ClassIndexMap {
        &self.index_map
    }

    /// Number of classes after filtering.
    pub fn class_count(&self) -> usize {
        self.index_map.len()
    }

    /// Retained class names in new-index order.
    pub fn retained_names(&self) -> &[String] {
        self.selection.names()
    }
}
