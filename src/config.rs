//! Run configuration, read once at startup and passed to every component.

use crate::error::IngestError;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;

/// Which embedding backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Ollama,
    OpenAI,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub ollama_host: String,
    pub model: String,
    pub openai_api_key: Option<String>,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub address: String,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub root: PathBuf,
    /// File extensions to ingest, without the dot. Empty means every
    /// extension with a registered grammar.
    pub extensions: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub max_depth: usize,
    /// Files per fan-out group.
    pub batch_size: usize,
    /// Concurrent file tasks within a group.
    pub concurrency: usize,
    /// Split threshold in characters.
    pub max_chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks estimated above this many tokens are dropped.
    pub hard_token_limit: usize,
    pub cache_path: PathBuf,
    pub whole_file_fallback: bool,
    pub evict_stale: bool,
    pub force: bool,
    pub log_file: Option<PathBuf>,
    /// Semantic-unit node kinds, keyed by language tag.
    pub semantic_units: HashMap<String, HashSet<String>>,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
}

const DEFAULT_EXCLUDE_DIRS: &[&str] = &[".git", "node_modules", "target", "vendor", "dist", "build"];

/// Semantic units per language tag.
const DEFAULT_SEMANTIC_UNITS: &[(&str, &[&str])] = &[
    (
        "rust",
        &["function_item", "struct_item", "enum_item", "trait_item", "impl_item"],
    ),
    (
        "typescript",
        &[
            "class_declaration",
            "abstract_class_declaration",
            "interface_declaration",
            "enum_declaration",
            "function_declaration",
            "method_definition",
        ],
    ),
    (
        "javascript",
        &[
            "class_declaration",
            "function_declaration",
            "generator_function_declaration",
            "method_definition",
        ],
    ),
    ("python", &["class_definition", "function_definition"]),
    (
        "go",
        &["type_declaration", "function_declaration", "method_declaration"],
    ),
    (
        "cpp",
        &["class_specifier", "struct_specifier", "enum_specifier", "function_definition"],
    ),
    (
        "java",
        &[
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "record_declaration",
            "method_declaration",
            "constructor_declaration",
        ],
    ),
    (
        "csharp",
        &[
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "struct_declaration",
            "record_declaration",
            "method_declaration",
            "constructor_declaration",
            "property_declaration",
        ],
    ),
];

pub fn default_semantic_units() -> HashMap<String, HashSet<String>> {
    DEFAULT_SEMANTIC_UNITS
        .iter()
        .map(|(language, units)| {
            (
                language.to_string(),
                units.iter().map(|u| u.to_string()).collect(),
            )
        })
        .collect()
}

impl IngestConfig {
    /// Defaults for ingesting `root`.
    pub fn new(root: PathBuf) -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            root,
            extensions: Vec::new(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|d| d.to_string()).collect(),
            max_depth: 32,
            batch_size: 32,
            concurrency: 4,
            max_chunk_size: 6000,
            chunk_overlap: 200,
            hard_token_limit: 8000,
            cache_path: PathBuf::from(home).join(".code-context/fingerprints.json"),
            whole_file_fallback: true,
            evict_stale: true,
            force: false,
            log_file: None,
            semantic_units: default_semantic_units(),
            embedding: EmbeddingConfig {
                backend: EmbeddingBackend::Ollama,
                ollama_host: "http://127.0.0.1:11434".to_string(),
                model: "nomic-embed-text".to_string(),
                openai_api_key: None,
                batch_size: 64,
            },
            store: StoreConfig {
                address: "http://127.0.0.1:19530".to_string(),
                collection: "code_chunks".to_string(),
            },
        }
    }

    /// Build from process environment variables.
    pub fn from_env(root: Option<PathBuf>) -> Result<Self, IngestError> {
        Self::from_lookup(root, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `root` wins over `INGEST_ROOT`,
    /// which wins over the current directory.
    pub fn from_lookup(
        root: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, IngestError> {
        let root = match root.or_else(|| lookup("INGEST_ROOT").map(PathBuf::from)) {
            Some(root) => root,
            None => std::env::current_dir()
                .map_err(|e| IngestError::Config(format!("cannot resolve current directory: {e}")))?,
        };
        let mut config = Self::new(root);

        if let Some(value) = lookup("INGEST_EXTENSIONS") {
            config.extensions = split_list(&value)
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }
        if let Some(value) = lookup("INGEST_EXCLUDE_DIRS") {
            config.exclude_dirs = split_list(&value);
        }
        parse_into(&lookup, "INGEST_MAX_DEPTH", &mut config.max_depth)?;
        parse_into(&lookup, "INGEST_BATCH_SIZE", &mut config.batch_size)?;
        parse_into(&lookup, "INGEST_CONCURRENCY", &mut config.concurrency)?;
        parse_into(&lookup, "INGEST_MAX_CHUNK_SIZE", &mut config.max_chunk_size)?;
        parse_into(&lookup, "INGEST_CHUNK_OVERLAP", &mut config.chunk_overlap)?;
        parse_into(&lookup, "INGEST_HARD_TOKEN_LIMIT", &mut config.hard_token_limit)?;
        parse_into(&lookup, "INGEST_WHOLE_FILE_FALLBACK", &mut config.whole_file_fallback)?;
        parse_into(&lookup, "INGEST_EVICT_STALE", &mut config.evict_stale)?;
        parse_into(&lookup, "INGEST_FORCE", &mut config.force)?;
        if let Some(value) = lookup("INGEST_CACHE_PATH") {
            config.cache_path = PathBuf::from(value);
        }
        config.log_file = lookup("INGEST_LOG_FILE").map(PathBuf::from);

        for (language, units) in config.semantic_units.iter_mut() {
            let key = format!("INGEST_SEMANTIC_UNITS_{}", language.to_ascii_uppercase());
            if let Some(value) = lookup(&key) {
                *units = split_list(&value).into_iter().collect();
            }
        }

        if let Some(value) = lookup("EMBEDDING_PROVIDER") {
            config.embedding.backend = match value.trim().to_ascii_lowercase().as_str() {
                "ollama" => EmbeddingBackend::Ollama,
                "openai" => EmbeddingBackend::OpenAI,
                other => {
                    return Err(IngestError::Config(format!(
                        "EMBEDDING_PROVIDER must be 'ollama' or 'openai', got '{other}'"
                    )))
                }
            };
        }
        if let Some(value) = lookup("OLLAMA_HOST") {
            config.embedding.ollama_host = value;
        }
        if let Some(value) = lookup("EMBEDDING_MODEL") {
            config.embedding.model = value;
        } else if config.embedding.backend == EmbeddingBackend::OpenAI {
            config.embedding.model = "text-embedding-3-small".to_string();
        }
        config.embedding.openai_api_key = lookup("OPENAI_API_KEY");
        parse_into(&lookup, "EMBEDDING_BATCH_SIZE", &mut config.embedding.batch_size)?;

        if let Some(value) = lookup("MILVUS_ADDRESS") {
            config.store.address = value;
        }
        if let Some(value) = lookup("MILVUS_COLLECTION") {
            config.store.collection = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or loop the pipeline.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chunk_size == 0 {
            return Err(IngestError::Config("max chunk size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.max_chunk_size {
            return Err(IngestError::Config(format!(
                "chunk overlap ({}) must be smaller than max chunk size ({})",
                self.chunk_overlap, self.max_chunk_size
            )));
        }
        if self.batch_size == 0 || self.concurrency == 0 {
            return Err(IngestError::Config(
                "batch size and concurrency must be positive".to_string(),
            ));
        }
        if self.embedding.backend == EmbeddingBackend::OpenAI && self.embedding.openai_api_key.is_none() {
            return Err(IngestError::Config(
                "OPENAI_API_KEY is required for the openai provider".to_string(),
            ));
        }
        Ok(())
    }

    /// Semantic units configured for a language, if it has any.
    pub fn units_for(&self, language: &str) -> Option<&HashSet<String>> {
        self.semantic_units.get(language)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_into<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), IngestError> {
    if let Some(value) = lookup(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| IngestError::Config(format!("{key} has invalid value '{value}'")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(Some(PathBuf::from("/repo")), lookup_from(&[])).unwrap();
        assert_eq!(config.root, PathBuf::from("/repo"));
        assert_eq!(config.concurrency, 4);
        assert!(config.exclude_dirs.contains(&"node_modules".to_string()));
        assert!(config.units_for("java").unwrap().contains("method_declaration"));
        assert_eq!(config.embedding.backend, EmbeddingBackend::Ollama);
    }

    #[test]
    fn test_overrides() {
        let config = IngestConfig::from_lookup(
            None,
            lookup_from(&[
                ("INGEST_ROOT", "/src"),
                ("INGEST_EXTENSIONS", ".java, py"),
                ("INGEST_CONCURRENCY", "8"),
                ("INGEST_FORCE", "true"),
                ("INGEST_SEMANTIC_UNITS_PYTHON", "function_definition"),
                ("EMBEDDING_PROVIDER", "OpenAI"),
                ("OPENAI_API_KEY", "sk-test"),
                ("MILVUS_COLLECTION", "repo_chunks"),
            ]),
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/src"));
        assert_eq!(config.extensions, vec!["java", "py"]);
        assert_eq!(config.concurrency, 8);
        assert!(config.force);
        assert_eq!(config.units_for("python").unwrap().len(), 1);
        assert_eq!(config.embedding.backend, EmbeddingBackend::OpenAI);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.store.collection, "repo_chunks");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        let err = IngestConfig::from_lookup(
            Some(PathBuf::from("/repo")),
            lookup_from(&[("INGEST_MAX_CHUNK_SIZE", "100"), ("INGEST_CHUNK_OVERLAP", "100")]),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_invalid_number_names_key() {
        let err = IngestConfig::from_lookup(
            Some(PathBuf::from("/repo")),
            lookup_from(&[("INGEST_BATCH_SIZE", "lots")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("INGEST_BATCH_SIZE"));
    }

    #[test]
    fn test_openai_requires_key() {
        let err = IngestConfig::from_lookup(
            Some(PathBuf::from("/repo")),
            lookup_from(&[("EMBEDDING_PROVIDER", "openai")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
