use std::cell::OnceCell;

use fastembed::{ EmbeddingModel, InitOptions, TextEmbedding };
use sha2::{ Digest, Sha256 };
use tracing::debug;

use crate::config::EmbedderKind;
use crate::error::ContextError;

pub const DEFAULT_HASH_DIM: usize = 256;
const FASTEMBED_MODEL_KEY: &str = "fastembed:all-minilm-l6-v2";

/// Turns text into fixed-size vectors for similarity scoring.
pub trait Embedder {
    /// Identifies the model and its parameters; an index built with one key
    /// is not comparable with vectors from another.
    fn model_key(&self) -> String;

    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ContextError>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, ContextError> {
        self.embed(vec![text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| ContextError::Embedding("no embedding returned".to_string()))
    }
}

/// Local ONNX sentence embeddings via fastembed.
pub struct FastEmbedder {
    model: TextEmbedding,
}

impl FastEmbedder {
    pub fn new() -> Result<Self, ContextError> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false)
        ).map_err(|e| ContextError::Embedding(e.to_string()))?;
        Ok(Self { model })
    }
}

impl Embedder for FastEmbedder {
    fn model_key(&self) -> String {
        FASTEMBED_MODEL_KEY.to_string()
    }

    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ContextError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model.embed(texts, None).map_err(|e| ContextError::Embedding(e.to_string()))
    }
}

/// Deterministic feature-hashing embedder. Needs no model download, so it
/// works offline and gives reproducible scores.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(64) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let normalized = text.to_lowercase();
        let tokens: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return vector;
        }

        for token in &tokens {
            self.add_feature(&mut vector, &format!("t:{}", token), 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("b:{}_{}", pair[0], pair[1]), 0.8);
        }
        let compact: Vec<char> = normalized
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        for tri in compact.windows(3) {
            let trigram: String = tri.iter().collect();
            self.add_feature(&mut vector, &format!("c:{}", trigram), 0.15);
        }

        let norm = vector
            .iter()
            .map(|v| v * v)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(head) % (self.dim as u64)) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

impl Embedder for HashEmbedder {
    fn model_key(&self) -> String {
        format!("hash-v1:{}", self.dim)
    }

    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ContextError> {
        Ok(
            texts
                .iter()
                .map(|t| self.embed_text(t))
                .collect()
        )
    }
}

/// Builds the configured embedder on first use, so runs that never embed
/// anything never load a model.
pub struct LazyEmbedder {
    kind: EmbedderKind,
    model: OnceCell<Box<dyn Embedder>>,
}

impl LazyEmbedder {
    pub fn new(kind: EmbedderKind) -> Self {
        Self {
            kind,
            model: OnceCell::new(),
        }
    }

    fn model(&self) -> Result<&dyn Embedder, ContextError> {
        if let Some(model) = self.model.get() {
            return Ok(model.as_ref());
        }
        debug!("Loading {:?} embedder", self.kind);
        let built: Box<dyn Embedder> = match self.kind {
            EmbedderKind::Fastembed => Box::new(FastEmbedder::new()?),
            EmbedderKind::Hash => Box::new(HashEmbedder::default()),
        };
        Ok(self.model.get_or_init(|| built).as_ref())
    }
}

impl Embedder for LazyEmbedder {
    fn model_key(&self) -> String {
        match self.kind {
            EmbedderKind::Fastembed => FASTEMBED_MODEL_KEY.to_string(),
            EmbedderKind::Hash => HashEmbedder::default().model_key(),
        }
    }

    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ContextError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model()?.embed(texts)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| x * y)
        .sum();
    let magnitude_a: f32 = a
        .iter()
        .map(|x| x * x)
        .sum::<f32>()
        .sqrt();
    let magnitude_b: f32 = b
        .iter()
        .map(|x| x * x)
        .sum::<f32>()
        .sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
