#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// Nine-class catalog used across the integration tests.
pub const NINE_CLASSES: [&str; 9] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
];

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}

/// Write `files` (relative path, contents) into `<root>/<split>/`.
pub fn write_split(root: &Path, split: &str, files: &[(&str, &str)]) {
    let dir = root.join(split);
    fs::create_dir_all(&dir).expect("create split dir");
    for (rel, contents) in files {
        write_file(&dir.join(rel), contents);
    }
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}

pub fn write_nine_class_config(path: &Path) {
    let names = NINE_CLASSES
        .iter()
        .enumerate()
        .map(|(i, name)| format!("  {}: {}\n", i, name))
        .collect::<String>();
    write_file(
        path,
        &format!("path: ../datasets/coco\ntrain: train2017.txt\nval: val2017.txt\n\nnc: 9\nnames:\n{}\n# trailing comment\ndownload: scripts/get_coco.sh\n", names),
    );
}
