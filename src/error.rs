use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the ingestion core itself, as opposed to adapter failures
/// which travel as `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid split window: overlap {overlap} must be smaller than max size {max_size}")]
    InvalidSplit { max_size: usize, overlap: usize },

    #[error("no grammar registered for extension '{extension}'")]
    UnsupportedExtension { extension: String },

    #[error("syntax errors left no extractable units in {0}")]
    EmptyParseTree(PathBuf),

    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),
}
