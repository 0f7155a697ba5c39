use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{ Deserialize, Serialize };
use surrealdb::engine::local::{ Db, RocksDb };
use surrealdb::Surreal;
use tracing::{ debug, info, warn };

use crate::embedding::{ cosine_similarity, Embedder };
use crate::error::ContextError;
use crate::models::{ DocumentMetadata, IndexedDocument, StoreMatch };

const NAMESPACE: &str = "codebase";
const DATABASE: &str = "context";

const SCHEMA: &str =
    "
    DEFINE TABLE documents SCHEMAFUL;
    DEFINE FIELD doc_id ON documents TYPE string;
    DEFINE FIELD content ON documents TYPE string;
    DEFINE FIELD filepath ON documents TYPE option<string>;
    DEFINE FIELD filetype ON documents TYPE option<string>;
    DEFINE FIELD size ON documents TYPE option<int>;
    DEFINE FIELD seq ON documents TYPE int;
    DEFINE FIELD embedding ON documents TYPE array<float>;

    DEFINE INDEX idx_doc_id ON documents FIELDS doc_id UNIQUE;

    DEFINE TABLE store_meta SCHEMALESS;
";

const REBUILD: &str =
    "
    BEGIN TRANSACTION;
    DELETE documents;
    FOR $doc IN $docs {
        CREATE documents CONTENT $doc;
    };
    UPDATE store_meta:embedder CONTENT $meta;
    COMMIT TRANSACTION;
";

#[derive(Debug, Serialize, Deserialize, Clone)]
struct DocumentRecord {
    doc_id: String,
    content: String,
    filepath: Option<String>,
    filetype: Option<String>,
    size: Option<u64>,
    seq: u64,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct StoreMeta {
    model_key: String,
    rebuilt_at: String,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

/// Result of opening the on-disk store. `Unavailable` is an expected state,
/// not an error: callers fall back to the recency scan.
pub enum StoreStatus {
    Available(SimilarityStore),
    Unavailable(String),
}

impl StoreStatus {
    pub fn store(&self) -> Option<&SimilarityStore> {
        match self {
            StoreStatus::Available(store) => Some(store),
            StoreStatus::Unavailable(_) => None,
        }
    }
}

/// Persistent document index with whole-corpus rebuild and
/// query-by-text semantics.
pub struct SimilarityStore {
    db: Surreal<Db>,
    embedder: Box<dyn Embedder>,
}

impl SimilarityStore {
    /// Opens or creates the store at `path`. Never fails: problems are
    /// reported as [`StoreStatus::Unavailable`].
    pub async fn initialize(path: &Path, embedder: Box<dyn Embedder>) -> StoreStatus {
        match Self::open(path, embedder).await {
            Ok(store) => {
                debug!("Opened similarity store at {}", path.display());
                StoreStatus::Available(store)
            }
            Err(e) => {
                warn!("Similarity store at {} unavailable: {}", path.display(), e);
                StoreStatus::Unavailable(e.to_string())
            }
        }
    }

    async fn open(path: &Path, embedder: Box<dyn Embedder>) -> Result<Self, ContextError> {
        fs::create_dir_all(path)?;
        let db_path = path.to_string_lossy();
        let db = Surreal::new::<RocksDb>(&*db_path).await?;
        db.use_ns(NAMESPACE).use_db(DATABASE).await?;
        if ensure_schema(&db).await? {
            debug!("Defined store schema at {}", path.display());
        }

        Ok(Self { db, embedder })
    }

    /// Replaces the whole corpus with `documents` in one transaction.
    /// Returns the number of documents written.
    pub async fn rebuild(&self, documents: Vec<IndexedDocument>) -> Result<usize, ContextError> {
        let texts: Vec<String> = documents
            .iter()
            .map(|doc| doc.content.clone())
            .collect();
        let embeddings = self.embedder.embed(texts)?;
        if embeddings.len() != documents.len() {
            return Err(
                ContextError::Embedding(
                    format!(
                        "expected {} embeddings, got {}",
                        documents.len(),
                        embeddings.len()
                    )
                )
            );
        }

        let records: Vec<DocumentRecord> = documents
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(seq, (doc, embedding))| DocumentRecord {
                doc_id: doc.id,
                content: doc.content,
                filepath: doc.metadata.filepath,
                filetype: doc.metadata.filetype,
                size: doc.metadata.size,
                seq: seq as u64,
                embedding,
            })
            .collect();
        let count = records.len();

        let meta = StoreMeta {
            model_key: self.embedder.model_key(),
            rebuilt_at: Utc::now().to_rfc3339(),
        };

        self.db.query(REBUILD).bind(("docs", records)).bind(("meta", meta)).await?.check()?;

        info!("Rebuilt similarity store with {} documents", count);
        Ok(count)
    }

    /// Up to `limit` documents ranked by similarity to `text`. Equal scores
    /// keep insertion order.
    pub async fn query(&self, text: &str, limit: usize) -> Result<Vec<StoreMatch>, ContextError> {
        if text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        self.ensure_compatible().await?;

        let records: Vec<DocumentRecord> = self.db
            .query(
                "SELECT doc_id, content, filepath, filetype, size, seq, embedding FROM documents ORDER BY seq"
            ).await?
            .take(0)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(text)?;
        let mut matches: Vec<StoreMatch> = records
            .into_iter()
            .map(|record| StoreMatch {
                score: cosine_similarity(&record.embedding, &query_vector),
                id: record.doc_id,
                content: record.content,
                metadata: DocumentMetadata {
                    filepath: record.filepath,
                    filetype: record.filetype,
                    size: record.size,
                },
            })
            .collect();

        // stable: ties stay in seq order
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        matches.truncate(limit);

        debug!("Similarity query returned {} matches", matches.len());
        Ok(matches)
    }

    pub async fn document_count(&self) -> Result<usize, ContextError> {
        let rows: Vec<CountRow> = self.db
            .query("SELECT count() AS count FROM documents GROUP ALL").await?
            .take(0)?;
        Ok(rows.first().map_or(0, |row| row.count.max(0) as usize))
    }

    async fn ensure_compatible(&self) -> Result<(), ContextError> {
        let meta: Option<StoreMeta> = self.db.select(("store_meta", "embedder")).await?;
        let current = self.embedder.model_key();
        match meta {
            Some(meta) if meta.model_key != current => {
                Err(ContextError::IncompatibleIndex {
                    stored: meta.model_key,
                    current,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Defines the tables unless a rebuild has already happened. Redefining the
/// unique index reindexes every row, so an existing store is left alone.
async fn ensure_schema(db: &Surreal<Db>) -> Result<bool, ContextError> {
    let meta: Option<StoreMeta> = db.select(("store_meta", "embedder")).await?;
    if meta.is_some() {
        return Ok(false);
    }
    db.query(SCHEMA).await?.check()?;
    Ok(true)
}
