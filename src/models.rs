use std::fmt;

use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "unknown";

/// Metadata stored next to each indexed document.
///
/// Fields are optional so records written by older builds, or by hand, still
/// load; the accessors substitute `"unknown"` for anything missing.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub filepath: Option<String>,
    pub filetype: Option<String>,
    pub size: Option<u64>,
}

impl DocumentMetadata {
    pub fn filepath(&self) -> &str {
        self.filepath.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn filetype(&self) -> &str {
        self.filetype.as_deref().unwrap_or(UNKNOWN)
    }
}

/// One source file as submitted to the similarity store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    /// Path relative to the indexed root; unique within one rebuild.
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// A ranked hit returned by the similarity store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreMatch {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FileContext {
    pub content: String,
    pub filepath: String,
    pub filetype: String,
}

impl From<StoreMatch> for FileContext {
    fn from(hit: StoreMatch) -> Self {
        Self {
            filepath: hit.metadata.filepath().to_string(),
            filetype: hit.metadata.filetype().to_string(),
            content: hit.content,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Nodejs,
    Python,
    Rust,
    Go,
    #[default]
    Unknown,
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectType::Nodejs => "nodejs",
            ProjectType::Python => "python",
            ProjectType::Rust => "rust",
            ProjectType::Go => "go",
            ProjectType::Unknown => UNKNOWN,
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CodebaseSummary {
    pub project_type: ProjectType,
    /// Immediate, non-hidden subdirectories of the root, sorted by name.
    pub directories: Vec<String>,
    /// Marker files found at the root.
    pub main_files: Vec<String>,
}

/// Context handed to prompt formatting. Built fresh for every request.
///
/// `similar_files` is relevance-ranked when it came from the similarity store
/// and recency-ranked when it came from the fallback scan; the two orders are
/// not comparable.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ContextBundle {
    pub current_file: Option<FileContext>,
    pub similar_files: Vec<FileContext>,
    pub codebase_summary: CodebaseSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Completion,
    Generation,
}
