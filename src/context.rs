use std::fs;
use std::path::{ Path, PathBuf };

use chrono::{ DateTime, Utc };
use tracing::{ debug, warn };

use crate::error::ContextError;
use crate::models::{ CodebaseSummary, ContextBundle, FileContext, ProjectType };
use crate::scanner::{ file_type, read_lossy, FileScanner };
use crate::store::SimilarityStore;

/// Most files whose content goes into one bundle.
pub const CONTEXT_FILE_CAP: usize = 10;
/// Characters kept per file on the fallback path.
pub const FALLBACK_CONTENT_CHARS: usize = 2000;

/// Marker files in priority order; the first one present decides the type.
const PROJECT_MARKERS: &[(&str, ProjectType)] = &[
    ("package.json", ProjectType::Nodejs),
    ("requirements.txt", ProjectType::Python),
    ("pyproject.toml", ProjectType::Python),
    ("Cargo.toml", ProjectType::Rust),
    ("go.mod", ProjectType::Go),
];

/// Builds a [`ContextBundle`] from the similarity store when it can, and from
/// the most recently modified source files otherwise.
pub struct ContextAssembler<'a> {
    store: Option<&'a SimilarityStore>,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(store: Option<&'a SimilarityStore>) -> Self {
        Self { store }
    }

    pub async fn assemble(
        &self,
        root: &Path,
        max_files: usize,
        current_file: Option<FileContext>
    ) -> ContextBundle {
        let codebase_summary = codebase_summary(root);

        let similar_files = match (self.store, &current_file) {
            (Some(store), Some(current)) if !current.content.trim().is_empty() => {
                match semantic_files(store, &current.content, max_files).await {
                    Ok(files) => files,
                    Err(e) => {
                        warn!("Similarity query failed, using recent files instead: {}", e);
                        recent_files(root, max_files)
                    }
                }
            }
            (None, _) => {
                debug!("No similarity store; using recent files");
                recent_files(root, max_files)
            }
            (Some(_), _) => {
                debug!("Current file is blank; using recent files");
                recent_files(root, max_files)
            }
        };

        ContextBundle {
            current_file,
            similar_files,
            codebase_summary,
        }
    }
}

async fn semantic_files(
    store: &SimilarityStore,
    query_text: &str,
    max_files: usize
) -> Result<Vec<FileContext>, ContextError> {
    let hits = store.query(query_text, CONTEXT_FILE_CAP.min(max_files)).await?;
    for hit in &hits {
        debug!("Similar: {} ({:.3})", hit.id, hit.score);
    }
    Ok(hits.into_iter().map(FileContext::from).collect())
}

/// Loads the editor buffer at `path` as query context. Unreadable files give
/// `None`, which sends the assembler down the recency path.
pub fn current_file_context(root: &Path, path: &Path) -> Option<FileContext> {
    let full = if path.is_absolute() { path.to_path_buf() } else { root.join(path) };
    match read_lossy(&full) {
        Ok(content) => Some(FileContext {
            content,
            filepath: full.strip_prefix(root).unwrap_or(&full).to_string_lossy().to_string(),
            filetype: file_type(&full),
        }),
        Err(e) => {
            warn!("Current file {} unreadable: {}", full.display(), e);
            None
        }
    }
}

/// Fallback path: newest files first, content truncated.
pub fn recent_files(root: &Path, max_files: usize) -> Vec<FileContext> {
    let scanner = FileScanner::new(root);
    let mut candidates: Vec<(PathBuf, DateTime<Utc>)> = scanner
        .files()
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified());
            match modified {
                Ok(time) => Some((path, DateTime::<Utc>::from(time))),
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    candidates.truncate(max_files);

    candidates
        .into_iter()
        .take(CONTEXT_FILE_CAP)
        .filter_map(|(path, modified)| {
            match read_lossy(&path) {
                Ok(content) => {
                    debug!("Including {} (modified {})", path.display(), modified.to_rfc3339());
                    Some(FileContext {
                        content: content.chars().take(FALLBACK_CONTENT_CHARS).collect(),
                        filepath: scanner.relative_path(&path),
                        filetype: file_type(&path),
                    })
                }
                Err(e) => {
                    debug!("Skipping unreadable {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect()
}

/// Project type and layout of `root`. Yields the zero value if the root
/// cannot be listed.
pub fn codebase_summary(root: &Path) -> CodebaseSummary {
    match try_codebase_summary(root) {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Could not summarize {}: {}", root.display(), e);
            CodebaseSummary::default()
        }
    }
}

fn try_codebase_summary(root: &Path) -> Result<CodebaseSummary, ContextError> {
    let main_files: Vec<String> = PROJECT_MARKERS.iter()
        .filter(|(marker, _)| root.join(marker).exists())
        .map(|(marker, _)| marker.to_string())
        .collect();
    let project_type = PROJECT_MARKERS.iter()
        .find(|(marker, _)| root.join(marker).exists())
        .map_or(ProjectType::Unknown, |(_, kind)| *kind);

    let mut directories = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.path().is_dir() && !name.starts_with('.') {
            directories.push(name);
        }
    }
    directories.sort();

    Ok(CodebaseSummary {
        project_type,
        directories,
        main_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::{ DocumentMetadata, IndexedDocument };
    use crate::store::StoreStatus;
    use anyhow::Result;
    use std::time::{ Duration, SystemTime };
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn set_age(path: &Path, seconds_ago: u64) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(seconds_ago)).unwrap();
    }

    #[test]
    fn test_go_project_hides_dot_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "go.mod", "module example.com/demo");
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();

        let summary = codebase_summary(dir.path());
        assert_eq!(summary.project_type, ProjectType::Go);
        assert_eq!(summary.directories, vec!["src".to_string()]);
        assert_eq!(summary.main_files, vec!["go.mod".to_string()]);
    }

    #[test]
    fn test_marker_priority() {
        let cases: &[(&[&str], ProjectType)] = &[
            (&["package.json"], ProjectType::Nodejs),
            (&["requirements.txt"], ProjectType::Python),
            (&["pyproject.toml"], ProjectType::Python),
            (&["Cargo.toml"], ProjectType::Rust),
            (&["go.mod"], ProjectType::Go),
            (&[], ProjectType::Unknown),
            (&["go.mod", "Cargo.toml"], ProjectType::Rust),
            (&["Cargo.toml", "pyproject.toml"], ProjectType::Python),
            (&["go.mod", "requirements.txt", "package.json"], ProjectType::Nodejs),
        ];

        for (markers, expected) in cases {
            let dir = TempDir::new().unwrap();
            for marker in *markers {
                write(dir.path(), marker, "");
            }
            assert_eq!(codebase_summary(dir.path()).project_type, *expected, "markers: {:?}", markers);
        }
    }

    #[test]
    fn test_files_are_not_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "lib/mod.rs", "");
        write(dir.path(), "notes.rs", "");

        assert_eq!(codebase_summary(dir.path()).directories, vec!["lib".to_string()]);
    }

    #[test]
    fn test_missing_root_yields_zero_summary() {
        let dir = TempDir::new().unwrap();
        let summary = codebase_summary(&dir.path().join("gone"));
        assert_eq!(summary, CodebaseSummary::default());
    }

    #[test]
    fn test_recent_files_orders_by_mtime_and_truncates() {
        let dir = TempDir::new().unwrap();
        let old = write(dir.path(), "old.py", "print('old')");
        let new = write(dir.path(), "pkg/new.rs", &"x".repeat(5000));
        write(dir.path(), "README.md", "not source");
        set_age(&old, 3600);
        set_age(&new, 10);

        let files = recent_files(dir.path(), 50);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filepath, Path::new("pkg").join("new.rs").to_string_lossy());
        assert_eq!(files[0].filetype, ".rs");
        assert_eq!(files[0].content.chars().count(), FALLBACK_CONTENT_CHARS);
        assert_eq!(files[1].filepath, "old.py");
        assert_eq!(files[1].content, "print('old')");
    }

    #[test]
    fn test_recent_files_caps() {
        let dir = TempDir::new().unwrap();
        for i in 0..15 {
            write(dir.path(), &format!("f{}.js", i), "let x = 1;");
        }

        assert_eq!(recent_files(dir.path(), 50).len(), CONTEXT_FILE_CAP);
        assert_eq!(recent_files(dir.path(), 3).len(), 3);
        assert!(recent_files(dir.path(), 0).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_recent_files_skips_dangling_symlink() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "live.rs", "fn live() {}");
        std::os::unix::fs::symlink(dir.path().join("gone.rs"), dir.path().join("dead.rs")).unwrap();

        let files = recent_files(dir.path(), 50);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filepath, "live.rs");
    }

    #[test]
    fn test_current_file_context() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/app.ts", "export const app = 1;");

        let current = current_file_context(dir.path(), Path::new("src/app.ts")).unwrap();
        assert_eq!(current.content, "export const app = 1;");
        assert_eq!(current.filepath, Path::new("src").join("app.ts").to_string_lossy());
        assert_eq!(current.filetype, ".ts");

        let absolute = current_file_context(dir.path(), &dir.path().join("src/app.ts")).unwrap();
        assert_eq!(absolute.filepath, current.filepath);

        assert!(current_file_context(dir.path(), Path::new("missing.ts")).is_none());
    }

    #[tokio::test]
    async fn test_no_sources_gives_empty_similar_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Cargo.toml", "[package]");
        write(dir.path(), "docs/guide.md", "# guide");

        let bundle = ContextAssembler::new(None).assemble(dir.path(), 50, None).await;
        assert!(bundle.similar_files.is_empty());
        assert!(bundle.current_file.is_none());
        assert_eq!(bundle.codebase_summary.project_type, ProjectType::Rust);
        assert_eq!(bundle.codebase_summary.directories, vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_store_falls_back_to_root_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/big.go", &"y".repeat(3000));
        write(dir.path(), "src/small.go", "package small");

        let current = FileContext {
            content: "package small".to_string(),
            filepath: "src/small.go".to_string(),
            filetype: ".go".to_string(),
        };
        let bundle = ContextAssembler::new(None).assemble(dir.path(), 50, Some(current)).await;

        assert_eq!(bundle.similar_files.len(), 2);
        for file in &bundle.similar_files {
            assert!(dir.path().join(&file.filepath).is_file());
            assert!(file.content.chars().count() <= FALLBACK_CONTENT_CHARS);
        }
    }

    #[tokio::test]
    async fn test_current_file_drives_semantic_query() -> Result<()> {
        let dir = TempDir::new()?;
        let db_dir = TempDir::new()?;
        write(dir.path(), "fresh.rs", "fn unrelated_but_recent() {}");

        let status = SimilarityStore::initialize(
            &db_dir.path().join("db"),
            Box::new(HashEmbedder::default())
        ).await;
        let store = status.store().expect("store should open");
        store.rebuild(
            vec![
                IndexedDocument {
                    id: "net/client.rs".to_string(),
                    content: "async fn fetch_user(client: &HttpClient, id: u64) -> User".to_string(),
                    metadata: DocumentMetadata {
                        filepath: Some("net/client.rs".to_string()),
                        filetype: Some(".rs".to_string()),
                        size: Some(60),
                    },
                },
                IndexedDocument {
                    id: "ui/theme.rs".to_string(),
                    content: "const PRIMARY_COLOR: Rgb = Rgb(10, 20, 30);".to_string(),
                    metadata: DocumentMetadata::default(),
                }
            ]
        ).await?;

        let current = FileContext {
            content: "fn fetch_user(client: &HttpClient)".to_string(),
            filepath: "main.rs".to_string(),
            filetype: ".rs".to_string(),
        };
        let bundle = ContextAssembler::new(Some(store)).assemble(dir.path(), 50, Some(current)).await;

        assert_eq!(bundle.similar_files.len(), 2);
        assert_eq!(bundle.similar_files[0].filepath, "net/client.rs");
        assert_eq!(bundle.similar_files[1].filepath, "unknown");
        assert_eq!(bundle.similar_files[1].filetype, "unknown");

        // Nothing to query with: recency path even with a live store.
        let bundle = ContextAssembler::new(Some(store)).assemble(dir.path(), 50, None).await;
        assert_eq!(bundle.similar_files.len(), 1);
        assert_eq!(bundle.similar_files[0].filepath, "fresh.rs");

        Ok(())
    }

    #[tokio::test]
    async fn test_blank_current_file_uses_recent_files() -> Result<()> {
        let dir = TempDir::new()?;
        let db_dir = TempDir::new()?;
        write(dir.path(), "recent.rs", "fn recently_edited() {}");

        let status = SimilarityStore::initialize(
            &db_dir.path().join("db"),
            Box::new(HashEmbedder::default())
        ).await;
        let store = status.store().expect("store should open");
        store.rebuild(
            vec![IndexedDocument {
                id: "indexed.rs".to_string(),
                content: "fn indexed() {}".to_string(),
                metadata: DocumentMetadata::default(),
            }]
        ).await?;

        let blank = FileContext {
            content: "   \n\t".to_string(),
            filepath: "empty.rs".to_string(),
            filetype: ".rs".to_string(),
        };
        let bundle = ContextAssembler::new(Some(store)).assemble(dir.path(), 50, Some(blank)).await;

        assert_eq!(bundle.similar_files.len(), 1);
        assert_eq!(bundle.similar_files[0].filepath, "recent.rs");
        assert_eq!(bundle.current_file.map(|f| f.filepath), Some("empty.rs".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_semantic_limit_follows_max_files() -> Result<()> {
        let dir = TempDir::new()?;
        let db_dir = TempDir::new()?;
        let status = SimilarityStore::initialize(
            &db_dir.path().join("db"),
            Box::new(HashEmbedder::default())
        ).await;
        let StoreStatus::Available(store) = status else {
            panic!("store should open");
        };
        let docs = (0..12)
            .map(|i| IndexedDocument {
                id: format!("m{}.rs", i),
                content: format!("fn module_{}() {{ shared_helper(); }}", i),
                metadata: DocumentMetadata::default(),
            })
            .collect();
        store.rebuild(docs).await?;

        let current = FileContext {
            content: "shared_helper".to_string(),
            filepath: "x.rs".to_string(),
            filetype: ".rs".to_string(),
        };
        let assembler = ContextAssembler::new(Some(&store));
        let bundle = assembler.assemble(dir.path(), 50, Some(current.clone())).await;
        assert_eq!(bundle.similar_files.len(), CONTEXT_FILE_CAP);
        let bundle = assembler.assemble(dir.path(), 4, Some(current)).await;
        assert_eq!(bundle.similar_files.len(), 4);

        Ok(())
    }
}
