use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

pub const SOURCE_EXTENSIONS: &[&str] = &[
    "py",
    "js",
    "ts",
    "jsx",
    "tsx",
    "vim",
    "lua",
    "go",
    "rs",
    "cpp",
    "c",
    "h",
    "java",
    "php",
    "rb",
    "swift",
    "kt",
    "scala",
    "sh",
    "bash",
    "zsh",
];

/// Enumerates source files under a root directory.
///
/// Each call to [`FileScanner::files`] starts a fresh walk, so the sequence can
/// be restarted at will. Entries that cannot be read are skipped.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    extensions: &'static [&'static str],
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: SOURCE_EXTENSIONS,
        }
    }

    pub fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(move |entry| self.is_source_file(entry.path()))
            .map(|entry| entry.into_path())
    }

    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| self.extensions.contains(&ext))
    }

    /// `path` relative to the scanned root; used as the document id.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

/// Extension of `path` with its leading dot, e.g. `.rs`.
pub fn file_type(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Reads a file as UTF-8, dropping any bytes that do not decode.
pub fn read_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => strip_invalid_utf8(e.as_bytes()),
    })
}

fn strip_invalid_utf8(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    while !bytes.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(rest.len());
                bytes = &rest[skip..];
            }
        }
    }
    out
}
