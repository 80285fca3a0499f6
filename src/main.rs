use anyhow::{Context, Result};
use code_context_ingest::config::{EmbeddingBackend, IngestConfig};
use code_context_ingest::embedding::ollama::OllamaEmbedding;
use code_context_ingest::embedding::openai::OpenAIEmbedding;
use code_context_ingest::embedding::EmbeddingProvider;
use code_context_ingest::ingest::report::{JsonLinesSink, OutcomeSink, TracingSink};
use code_context_ingest::ingest::IngestionPipeline;
use code_context_ingest::parser::code_parser::CodeParser;
use code_context_ingest::vector_db::milvus::MilvusVectorDatabase;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Load .env files from multiple locations with priority order:
/// 1. Current working directory (project-specific config)
/// 2. XDG config directory ~/.config/code-context-ingest/.env (global default config)
///
/// Environment variables set directly in the shell always take highest priority.
fn load_env_files() {
    let cwd_env = std::env::current_dir().map(|p| p.join(".env")).ok();
    if let Some(path) = cwd_env {
        if path.exists() && dotenv::from_path(&path).is_ok() {
            tracing::debug!("Loaded .env from: {}", path.display());
            return;
        }
    }

    if let Some(config_dir) = get_xdg_config_dir() {
        let xdg_env = config_dir.join("code-context-ingest").join(".env");
        if xdg_env.exists() && dotenv::from_path(&xdg_env).is_ok() {
            tracing::debug!("Loaded .env from: {}", xdg_env.display());
            return;
        }
    }

    tracing::debug!("No .env file found, using environment variables only");
}

/// Get XDG config directory, fallback to ~/.config
fn get_xdg_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

fn build_embedding(config: &IngestConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let provider: Arc<dyn EmbeddingProvider> = match embedding.backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedding::new(
            &embedding.ollama_host,
            &embedding.model,
        )),
        EmbeddingBackend::OpenAI => {
            let api_key = embedding
                .openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is not set")?;
            Arc::new(OpenAIEmbedding::new(api_key, &embedding.model, embedding.batch_size))
        }
    };
    Ok(provider)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_files();

    // Logs go to stderr; RUST_LOG overrides the default level
    let env_filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let root = std::env::args().nth(1).map(PathBuf::from);
    let config = IngestConfig::from_env(root)?;

    let embedding = build_embedding(&config)?;
    let store = Arc::new(MilvusVectorDatabase::new(
        &config.store.address,
        &config.store.collection,
        embedding.dimension(),
    ));
    let sink: Arc<dyn OutcomeSink> = match &config.log_file {
        Some(path) => Arc::new(JsonLinesSink::open(path)?),
        None => Arc::new(TracingSink),
    };

    let pipeline = IngestionPipeline::new(config, Arc::new(CodeParser::new()), embedding, store)
        .with_sink(sink);

    let summary = pipeline.run().await?;

    for failure in &summary.failures {
        tracing::warn!("{} {}: {}", failure.kind, failure.path.display(), failure.message);
    }
    println!(
        "Processed {} files, skipped {}, {} errors, {} chunks created in {:.2?}",
        summary.processed, summary.skipped, summary.errors, summary.chunks_created, summary.duration
    );

    Ok(())
}
