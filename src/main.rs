use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod context;
mod coordinator;
mod embedding;
mod error;
mod models;
mod ollama;
mod prompt;
mod scanner;
mod store;

use config::{ AssistantConfig, EmbedderKind };
use coordinator::{ Outcome, Request, RetrievalCoordinator };
use models::Mode;

/// Codebase-aware prompt bridge between an editor and an Ollama model.
#[derive(Debug, Parser)]
#[command(name = "codebase-context", version)]
struct Cli {
    /// The prompt to send to the model
    prompt: String,

    /// completion or generation
    #[arg(value_enum)]
    mode: Mode,

    /// Project root to draw context from
    #[arg(long, default_value = ".")]
    cwd: PathBuf,

    #[arg(long, env = "OLLAMA_URL", default_value = config::DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    #[arg(long, env = "OLLAMA_MODEL", default_value = config::DEFAULT_MODEL)]
    model: String,

    /// Directory holding the similarity index
    #[arg(long, alias = "chroma-dir", default_value = config::DEFAULT_STORE_DIR)]
    store_dir: PathBuf,

    /// Rebuild the index from the project and exit
    #[arg(long)]
    update_index: bool,

    #[arg(long, value_enum, default_value_t = EmbedderKind::Fastembed)]
    embedder: EmbedderKind,

    /// Upper bound on files considered for context
    #[arg(long, default_value_t = config::DEFAULT_MAX_FILES)]
    max_files: usize,

    /// Editor buffer to find similar code for
    #[arg(long)]
    current_file: Option<PathBuf>,

    /// Print the assembled context as JSON instead of querying the model
    #[arg(long)]
    print_context: bool,
}

impl Cli {
    fn split(self) -> (AssistantConfig, Request) {
        let config = AssistantConfig {
            cwd: self.cwd,
            ollama_url: self.ollama_url,
            model: self.model,
            store_dir: self.store_dir,
            embedder: self.embedder,
            max_files: self.max_files,
            current_file: self.current_file,
            print_context: self.print_context,
        };
        let request = Request {
            prompt: self.prompt,
            mode: self.mode,
            update_index: self.update_index,
        };
        (config, request)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let (config, request) = Cli::parse().split();
    let coordinator = RetrievalCoordinator::open(config).await;

    match coordinator.run(&request).await {
        Outcome::Indexed(outcome) => println!("{}", outcome.status_line()),
        Outcome::Context(bundle) => println!("{}", serde_json::to_string_pretty(&bundle)?),
        Outcome::Reply(reply) => println!("{}", reply.text()),
    }

    Ok(())
}
