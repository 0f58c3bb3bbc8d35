use std::path::Path;

use serde::{Deserialize, Serialize};

/// One labeled embedding. Created by the extractor with an empty label;
/// the label is filled in by `assign_labels` and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub file_path: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub label: String,
}

/// Dataset split a batch of records belongs to. Not stored on the record
/// itself; passed alongside it to the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label every record with the name of the immediate parent directory of
/// its source file. Pure function of the path string.
pub fn assign_labels(records: &mut [EmbeddingRecord]) {
    for record in records.iter_mut() {
        record.label = parent_dir_name(&record.file_path);
    }
}

fn parent_dir_name(file_path: &str) -> String {
    Path::new(file_path)
        .parent()
        .and_then(Path::file_name)
        .map_or_else(String::new, |name| name.to_string_lossy().to_string())
}
