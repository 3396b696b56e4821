//! Class selection: which classes of the base taxonomy survive filtering.
//!
//! The selection is produced by a [`ClassSelector`], the seam where a fixed
//! list, a CLI flag, or an interactive picker plugs in. The core only ever
//! sees the finished [`Selection`].

pub mod catalog;

use std::collections::BTreeSet;

use crate::error::LabelsiftError;

/// Immutable ordered list of every class name in the base taxonomy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCatalog {
    names: Vec<String>,
}

impl ClassCatalog {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Index of the first class with this exact name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// A finalized class selection.
///
/// `names` is aligned with the ascending order of `retained`, which is also
/// the order new indices are assigned in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    retained: BTreeSet<usize>,
    names: Vec<String>,
}

impl Selection {
    /// Build a selection, checking that it is non-empty and that every
    /// retained index has exactly one name.
    pub fn new(retained: BTreeSet<usize>, names: Vec<String>) -> Result<Self, LabelsiftError> {
        if retained.is_empty() {
            return Err(LabelsiftError::EmptySelection);
        }
        if retained.len() != names.len() {
            return Err(LabelsiftError::SelectionMismatch {
                message: format!(
                    "{} class(es) retained but {} name(s) supplied",
                    retained.len(),
                    names.len()
                ),
            });
        }
        Ok(Self { retained, names })
    }

    pub fn retained(&self) -> &BTreeSet<usize> {
        &self.retained
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }
}

/// Produces a selection from a catalog.
pub trait ClassSelector {
    fn select(&self, catalog: &ClassCatalog) -> Result<Selection, LabelsiftError>;
}

/// Select classes by original index, optionally renaming them.
#[derive(Clone, Debug, Default)]
pub struct IndexSelector {
    pub indices: Vec<usize>,
    /// Names to write for the retained classes, in ascending index order.
    /// When absent the catalog names are used.
    pub names: Option<Vec<String>>,
}

impl ClassSelector for IndexSelector {
    fn select(&self, catalog: &ClassCatalog) -> Result<Selection, LabelsiftError> {
        let retained: BTreeSet<usize> = self.indices.iter().copied().collect();
        if retained.is_empty() {
            return Err(LabelsiftError::EmptySelection);
        }

        for &index in &retained {
            if index >= catalog.len() {
                return Err(LabelsiftError::UnknownClassIndex {
                    index,
                    catalog_len: catalog.len(),
                });
            }
        }

        let names = match &self.names {
            Some(names) => names.clone(),
            None => retained
                .iter()
                .filter_map(|&index| catalog.name(index))
                .map(str::to_string)
                .collect(),
        };

        Selection::new(retained, names)
    }
}

/// Select classes by catalog name.
#[derive(Clone, Debug, Default)]
pub struct NameSelector {
    pub names: Vec<String>,
}

impl ClassSelector for NameSelector {
    fn select(&self, catalog: &ClassCatalog) -> Result<Selection, LabelsiftError> {
        let mut indices = Vec::with_capacity(self.names.len());
        for raw in &self.names {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let index = catalog
                .index_of(name)
                .ok_or_else(|| LabelsiftError::UnknownClassName {
                    name: name.to_string(),
                })?;
            indices.push(index);
        }

        IndexSelector {
            indices,
            names: None,
        }
        .select(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ClassCatalog {
        catalog::coco80()
    }

    #[test]
    fn index_selector_uses_catalog_names_in_ascending_order() {
        let selector = IndexSelector {
            indices: vec![14, 0, 7, 0],
            names: None,
        };
        let selection = selector.select(&catalog()).expect("select");

        assert_eq!(selection.len(), 3);
        assert_eq!(
            selection.retained().iter().copied().collect::<Vec<_>>(),
            vec![0, 7, 14]
        );
        assert_eq!(selection.names(), ["person", "truck", "bird"]);
    }

    #[test]
    fn index_selector_accepts_name_override() {
        let selector = IndexSelector {
            indices: vec![1, 3],
            names: Some(vec!["two-wheeler".to_string(), "motorbike".to_string()]),
        };
        let selection = selector.select(&catalog()).expect("select");
        assert_eq!(selection.names(), ["two-wheeler", "motorbike"]);
    }

    #[test]
    fn index_selector_rejects_override_of_wrong_length() {
        let selector = IndexSelector {
            indices: vec![1, 3],
            names: Some(vec!["only-one".to_string()]),
        };
        let err = selector.select(&catalog()).unwrap_err();
        assert!(matches!(err, LabelsiftError::SelectionMismatch { .. }));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let err = IndexSelector::default().select(&catalog()).unwrap_err();
        assert!(matches!(err, LabelsiftError::EmptySelection));

        let err = NameSelector {
            names: vec!["  ".to_string()],
        }
        .select(&catalog())
        .unwrap_err();
        assert!(matches!(err, LabelsiftError::EmptySelection));
    }

    #[test]
    fn out_of_catalog_index_is_rejected() {
        let selector = IndexSelector {
            indices: vec![0, 80],
            names: None,
        };
        let err = selector.select(&catalog()).unwrap_err();
        assert!(matches!(
            err,
            LabelsiftError::UnknownClassIndex {
                index: 80,
                catalog_len: 80
            }
        ));
    }

    #[test]
    fn name_selector_resolves_against_catalog() {
        let selector = NameSelector {
            names: vec!["dog".to_string(), "person".to_string()],
        };
        let selection = selector.select(&catalog()).expect("select");
        assert_eq!(
            selection.retained().iter().copied().collect::<Vec<_>>(),
            vec![0, 16]
        );
        assert_eq!(selection.names(), ["person", "dog"]);
    }

    #[test]
    fn name_selector_rejects_unknown_names() {
        let selector = NameSelector {
            names: vec!["unicorn".to_string()],
        };
        let err = selector.select(&catalog()).unwrap_err();
        assert!(matches!(err, LabelsiftError::UnknownClassName { .. }));
    }
}
