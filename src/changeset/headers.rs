use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a changeset is a full snapshot or a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Full enumeration of the tracked files.
    #[serde(rename = "C")]
    Coverage,
    /// Added, changed and removed files since the previous coverage snapshot.
    #[serde(rename = "D")]
    Drift,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Coverage => f.write_str("coverage"),
            Category::Drift => f.write_str("drift"),
        }
    }
}

/// Metadata record written at the top of every changeset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    pub resource_id: i32,
    pub definition_id: i32,
    pub definition_name: String,
    pub base_dir: String,
    pub category: Category,
    pub version: u32,
}
