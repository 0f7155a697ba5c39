use std::path::Path;

use tracing::{ debug, info, warn };

use crate::config::{ expand_home, AssistantConfig };
use crate::context::{ current_file_context, ContextAssembler };
use crate::embedding::LazyEmbedder;
use crate::models::{ ContextBundle, DocumentMetadata, IndexedDocument, Mode };
use crate::ollama::{ ModelClient, ModelReply, OllamaClient };
use crate::prompt::build_prompt;
use crate::scanner::{ file_type, read_lossy, FileScanner };
use crate::store::{ SimilarityStore, StoreStatus };

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Rebuilt {
        documents: usize,
    },
    StoreUnavailable,
    Failed(String),
}

impl IndexOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IndexOutcome::Rebuilt { .. })
    }

    pub fn status_line(&self) -> &'static str {
        if self.is_success() { "Index updated successfully" } else { "Failed to update index" }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub prompt: String,
    pub mode: Mode,
    pub update_index: bool,
}

#[derive(Debug)]
pub enum Outcome {
    Indexed(IndexOutcome),
    Context(ContextBundle),
    Reply(ModelReply),
}

/// Owns the store handle and model client for one invocation and routes a
/// request to index rebuild or context retrieval.
pub struct RetrievalCoordinator<M: ModelClient> {
    config: AssistantConfig,
    store: StoreStatus,
    model: M,
}

impl RetrievalCoordinator<OllamaClient> {
    pub async fn open(config: AssistantConfig) -> Self {
        let store = open_store(&config).await;
        if let StoreStatus::Unavailable(reason) = &store {
            info!("Continuing without similarity index ({}); context comes from recent files", reason);
        }
        let model = OllamaClient::new(&config.ollama_url, &config.model);
        Self::new(config, store, model)
    }
}

impl<M: ModelClient> RetrievalCoordinator<M> {
    pub fn new(config: AssistantConfig, store: StoreStatus, model: M) -> Self {
        Self { config, store, model }
    }

    pub async fn run(&self, request: &Request) -> Outcome {
        if request.update_index {
            return Outcome::Indexed(self.update_index().await);
        }

        let context = self.context().await;
        if self.config.print_context {
            return Outcome::Context(context);
        }

        let prompt = build_prompt(&request.prompt, &context, request.mode);
        Outcome::Reply(self.model.generate(&prompt, request.mode).await)
    }

    /// Rebuilds the store from a fresh scan of the working directory.
    pub async fn update_index(&self) -> IndexOutcome {
        let Some(store) = self.store.store() else {
            warn!("Index update skipped: similarity store unavailable");
            return IndexOutcome::StoreUnavailable;
        };

        let documents = collect_documents(&FileScanner::new(&self.config.cwd));
        info!("Indexing {} files under {}", documents.len(), self.config.cwd.display());

        match store.rebuild(documents).await {
            Ok(documents) => {
                match store.document_count().await {
                    Ok(stored) if stored != documents => {
                        warn!("Rebuilt {} documents but the store reports {}", documents, stored);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Could not count stored documents: {}", e),
                }
                IndexOutcome::Rebuilt { documents }
            }
            Err(e) => {
                warn!("Index rebuild failed: {}", e);
                IndexOutcome::Failed(e.to_string())
            }
        }
    }

    pub async fn context(&self) -> ContextBundle {
        let current_file = self.config.current_file
            .as_deref()
            .and_then(|path| current_file_context(&self.config.cwd, path));
        ContextAssembler::new(self.store.store()).assemble(
            &self.config.cwd,
            self.config.max_files,
            current_file
        ).await
    }
}

async fn open_store(config: &AssistantConfig) -> StoreStatus {
    let path = match expand_home(&config.store_dir) {
        Ok(path) => path,
        Err(e) => {
            warn!("Similarity store unavailable: {}", e);
            return StoreStatus::Unavailable(e.to_string());
        }
    };
    SimilarityStore::initialize(&path, Box::new(LazyEmbedder::new(config.embedder))).await
}

/// Reads every source file under the scanner root. Unreadable and blank
/// files are left out.
pub fn collect_documents(scanner: &FileScanner) -> Vec<IndexedDocument> {
    scanner
        .files()
        .filter_map(|path| read_document(scanner, &path))
        .collect()
}

fn read_document(scanner: &FileScanner, path: &Path) -> Option<IndexedDocument> {
    let content = match read_lossy(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Skipping unreadable {}: {}", path.display(), e);
            return None;
        }
    };
    if content.trim().is_empty() {
        debug!("Skipping blank {}", path.display());
        return None;
    }

    let id = scanner.relative_path(path);
    Some(IndexedDocument {
        metadata: DocumentMetadata {
            filepath: Some(id.clone()),
            filetype: Some(file_type(path)),
            size: Some(content.chars().count() as u64),
        },
        id,
        content,
    })
}
