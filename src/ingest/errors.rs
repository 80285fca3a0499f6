//! Closed error taxonomy for per-file outcomes.

use crate::error::IngestError;
use serde::Serialize;
use std::fmt;

/// Status of one file in a run. `Success` and `Skipped` are the non-error
/// members; everything else comes out of [`ErrorKind::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Success,
    Skipped,
    ParseError,
    ChunkError,
    EmbeddingError,
    StorageError,
    RateLimit,
    TokenLimit,
    UnknownError,
}

/// Keyword table, checked in order; the first kind with a matching phrase wins.
const RULES: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::TokenLimit,
        &[
            "maximum context length",
            "context length",
            "context_length_exceeded",
            "token limit",
            "too many tokens",
        ],
    ),
    (
        ErrorKind::RateLimit,
        &["429", "rate limit", "rate_limit", "ratelimit", "too many requests"],
    ),
    (ErrorKind::ParseError, &["parse", "syntax"]),
    (ErrorKind::ChunkError, &["chunk"]),
    (ErrorKind::EmbeddingError, &["embed"]),
    (
        ErrorKind::StorageError,
        &["upsert", "storage", "vector store", "milvus", "collection"],
    ),
];

impl ErrorKind {
    /// Map free-form failure text to a taxonomy member. Case-insensitive.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        RULES
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| message.contains(needle)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ErrorKind::UnknownError)
    }

    /// Classify an error, trusting typed core errors over message text.
    pub fn of(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<IngestError>() {
            Some(IngestError::EmptyParseTree(_)) => ErrorKind::ParseError,
            Some(IngestError::InvalidSplit { .. }) => ErrorKind::ChunkError,
            Some(IngestError::StoreUnavailable(_)) => ErrorKind::StorageError,
            Some(IngestError::UnsupportedExtension { .. } | IngestError::Config(_)) | None => {
                Self::classify(&format!("{:#}", error))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Success => "SUCCESS",
            ErrorKind::Skipped => "SKIPPED",
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::ChunkError => "CHUNK_ERROR",
            ErrorKind::EmbeddingError => "EMBEDDING_ERROR",
            ErrorKind::StorageError => "STORAGE_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::TokenLimit => "TOKEN_LIMIT",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::path::PathBuf;

    #[test]
    fn test_classify_taxonomy() {
        let cases = [
            ("OpenAI embedding API error (429 Too Many Requests)", ErrorKind::RateLimit),
            ("This model's maximum context length is 8192 tokens", ErrorKind::TokenLimit),
            ("Rate limit reached for requests", ErrorKind::RateLimit),
            ("Failed to parse code", ErrorKind::ParseError),
            ("unexpected SYNTAX near line 4", ErrorKind::ParseError),
            ("chunk exceeds budget", ErrorKind::ChunkError),
            ("Failed to send embedding request to Ollama", ErrorKind::EmbeddingError),
            ("Milvus upsert error (code 1100): bad row", ErrorKind::StorageError),
            ("disk on fire", ErrorKind::UnknownError),
        ];
        for (message, expected) in cases {
            assert_eq!(ErrorKind::classify(message), expected, "{message}");
        }
    }

    #[test]
    fn test_first_match_wins() {
        // Token overflow reported by the embedding call is still a token limit
        assert_eq!(
            ErrorKind::classify("embedding failed: maximum context length exceeded"),
            ErrorKind::TokenLimit
        );
        assert_eq!(
            ErrorKind::classify("Milvus upsert error (429): slow down"),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_classification_sees_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("Failed to send Milvus upsert request");
        assert_eq!(ErrorKind::of(&err), ErrorKind::StorageError);
    }

    #[test]
    fn test_typed_errors() {
        let err = anyhow::Error::new(IngestError::EmptyParseTree(PathBuf::from("/x/B.java")));
        assert_eq!(ErrorKind::of(&err), ErrorKind::ParseError);

        let err = anyhow::Error::new(IngestError::UnsupportedExtension {
            extension: "xyz".to_string(),
        });
        assert_eq!(ErrorKind::of(&err), ErrorKind::UnknownError);

        let err: anyhow::Result<()> = Err(IngestError::InvalidSplit { max_size: 1, overlap: 1 })
            .context("while bounding sizes");
        assert_eq!(ErrorKind::of(&err.unwrap_err()), ErrorKind::ChunkError);
    }

    #[test]
    fn test_serializes_as_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorKind::RateLimit).unwrap(), "\"RATE_LIMIT\"");
        assert_eq!(ErrorKind::EmbeddingError.to_string(), "EMBEDDING_ERROR");
    }
}
