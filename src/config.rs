use std::path::{ Path, PathBuf };

use crate::error::ContextError;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5-coder";
pub const DEFAULT_STORE_DIR: &str = "~/.vim-assistant-index";
pub const DEFAULT_MAX_FILES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EmbedderKind {
    /// Local ONNX sentence-embedding model (downloaded on first use)
    #[default]
    Fastembed,
    /// Deterministic feature hashing, no model download
    Hash,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub cwd: PathBuf,
    pub ollama_url: String,
    pub model: String,
    pub store_dir: PathBuf,
    pub embedder: EmbedderKind,
    pub max_files: usize,
    /// Editor buffer used as the similarity query.
    pub current_file: Option<PathBuf>,
    pub print_context: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            embedder: EmbedderKind::default(),
            max_files: DEFAULT_MAX_FILES,
            current_file: None,
            print_context: false,
        }
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf, ContextError> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir().ok_or_else(||
        ContextError::Config("cannot resolve home directory".to_string())
    )?;
    Ok(home.join(rest))
}
