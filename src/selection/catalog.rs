//! Class catalog loading.
//!
//! A catalog can come from a `classes.txt` file (one name per line), from any
//! YAML file with a `names` field (the Ultralytics `data.yaml` shape), or from
//! the built-in 80-class COCO taxonomy.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::ClassCatalog;
use crate::error::LabelsiftError;

/// The 80 COCO detection classes in Ultralytics index order.
pub const COCO80_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// The built-in COCO catalog.
pub fn coco80() -> ClassCatalog {
    ClassCatalog::new(COCO80_NAMES.iter().map(|name| name.to_string()).collect())
}

/// Read a catalog from a file, picking the parser from the extension.
///
/// `.yaml`/`.yml` files are read through their `names` field; anything else
/// is treated as a `classes.txt` list.
pub fn read_catalog(path: &Path) -> Result<ClassCatalog, LabelsiftError> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        read_yaml_names(path)
    } else {
        read_classes_txt(path)
    }
}

#[derive(Debug, Deserialize)]
struct NamesDocument {
    names: Option<NamesField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamesField {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

/// Read the `names` field of a YAML dataset config.
pub fn read_yaml_names(path: &Path) -> Result<ClassCatalog, LabelsiftError> {
    let data = fs::read_to_string(path).map_err(|source| LabelsiftError::ConfigUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: NamesDocument =
        serde_yaml::from_str(&data).map_err(|source| LabelsiftError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

    let names = match parsed.names {
        None => {
            return Err(LabelsiftError::ConfigFieldMissing {
                path: path.to_path_buf(),
                field: "names",
            })
        }
        Some(NamesField::Sequence(names)) => names,
        Some(NamesField::Mapping(mapping)) => names_from_mapping(path, mapping)?,
    };

    if names.is_empty() {
        return Err(LabelsiftError::CatalogInvalid {
            path: path.to_path_buf(),
            message: "names field is empty".to_string(),
        });
    }

    Ok(ClassCatalog::new(names))
}

/// Placeholder slots tolerated beyond the number of mapped names.
const MAX_NAME_GAPS: usize = 1024;

// Gaps in an index mapping get placeholder names so indices stay positional.
fn names_from_mapping(
    path: &Path,
    mapping: BTreeMap<usize, String>,
) -> Result<Vec<String>, LabelsiftError> {
    let Some(max_index) = mapping.keys().max().copied() else {
        return Ok(Vec::new());
    };

    let limit = mapping.len().saturating_add(MAX_NAME_GAPS);
    let len = match max_index.checked_add(1) {
        Some(len) if len <= limit => len,
        _ => {
            return Err(LabelsiftError::CatalogInvalid {
                path: path.to_path_buf(),
                message: format!(
                    "class index {} is too sparse for {} name(s)",
                    max_index,
                    mapping.len()
                ),
            })
        }
    };

    let mut names = vec![String::new(); len];
    for (index, name) in mapping {
        names[index] = name;
    }
    for (index, name) in names.iter_mut().enumerate() {
        if name.trim().is_empty() {
            *name = format!("class_{}", index);
        }
    }
    Ok(names)
}

fn read_classes_txt(path: &Path) -> Result<ClassCatalog, LabelsiftError> {
    let data = fs::read_to_string(path).map_err(|source| LabelsiftError::FileIoFailure {
        path: path.to_path_buf(),
        source,
    })?;
    let mut names = Vec::new();

    for (line_idx, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(LabelsiftError::CatalogInvalid {
                path: path.to_path_buf(),
                message: format!("line {} is empty", line_idx + 1),
            });
        }
        names.push(trimmed.to_string());
    }

    if names.is_empty() {
        return Err(LabelsiftError::CatalogInvalid {
            path: path.to_path_buf(),
            message: "no class names found".to_string(),
        });
    }

    Ok(ClassCatalog::new(names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco80_has_expected_anchors() {
        let catalog = coco80();
        assert_eq!(catalog.len(), 80);
        assert_eq!(catalog.name(0), Some("person"));
        assert_eq!(catalog.name(7), Some("truck"));
        assert_eq!(catalog.name(18), Some("sheep"));
        assert_eq!(catalog.name(79), Some("toothbrush"));
    }

    #[test]
    fn yaml_sequence_names_are_read_in_order() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("data.yaml");
        fs::write(&path, "path: ../coco\nnc: 3\nnames: ['cat', 'dog', 'bird']\n")
            .expect("write yaml");

        let catalog = read_catalog(&path).expect("read catalog");
        assert_eq!(catalog.names(), ["cat", "dog", "bird"]);
    }

    #[test]
    fn yaml_mapping_names_fill_gaps() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("data.yml");
        fs::write(&path, "names:\n  0: person\n  2: car\n").expect("write yaml");

        let catalog = read_catalog(&path).expect("read catalog");
        assert_eq!(catalog.names(), ["person", "class_1", "car"]);
    }

    #[test]
    fn yaml_mapping_with_huge_index_is_rejected() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("data.yaml");

        for body in [
            "names:\n  18446744073709551615: person\n",
            "names:\n  0: person\n  1000000000000000: car\n",
        ] {
            fs::write(&path, body).expect("write yaml");
            let err = read_catalog(&path).unwrap_err();
            assert!(matches!(err, LabelsiftError::CatalogInvalid { .. }), "{body}");
        }
    }

    #[test]
    fn yaml_without_names_is_rejected() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("data.yaml");
        fs::write(&path, "nc: 3\n").expect("write yaml");

        let err = read_catalog(&path).unwrap_err();
        assert!(matches!(err, LabelsiftError::ConfigFieldMissing { .. }));
    }

    #[test]
    fn classes_txt_rejects_blank_lines() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("classes.txt");
        fs::write(&path, "person\n\ncar\n").expect("write classes");

        let err = read_catalog(&path).unwrap_err();
        assert!(matches!(err, LabelsiftError::CatalogInvalid { .. }));
    }

    #[test]
    fn classes_txt_trims_names() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("classes.txt");
        fs::write(&path, " person \ncar\n").expect("write classes");

        let catalog = read_catalog(&path).expect("read catalog");
        assert_eq!(catalog.names(), ["person", "car"]);
    }
}
