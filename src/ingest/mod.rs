//! Batch orchestration of the ingestion pipeline.

pub mod errors;
pub mod report;

use crate::config::IngestConfig;
use crate::discovery::FileDiscovery;
use crate::embedding::{estimate_tokens, EmbeddingProvider};
use crate::error::IngestError;
use crate::parser::code_parser::{ParsedSource, SourceParser};
use crate::parser::extractor::{whole_file_chunk, SemanticExtractor, SourceFile};
use crate::parser::identity::{assign_ids, content_hash};
use crate::parser::splitter::split;
use crate::parser::Chunk;
use crate::snapshot::{modified_millis, ChangeTracker, FileFingerprint};
use crate::vector_db::VectorStore;
use anyhow::{Context, Result};
use errors::ErrorKind;
use futures::stream::{self, StreamExt};
use report::{OutcomeRecord, OutcomeSink, TracingSink};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;
use uuid::Uuid;

/// Result of ingesting one file
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionOutcome {
    /// Fingerprint says unchanged.
    Skipped,
    Processed { chunks: usize },
    Failed { kind: ErrorKind, message: String },
}

impl IngestionOutcome {
    pub fn status(&self) -> ErrorKind {
        match self {
            IngestionOutcome::Skipped => ErrorKind::Skipped,
            IngestionOutcome::Processed { .. } => ErrorKind::Success,
            IngestionOutcome::Failed { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregate counts for one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub session_id: String,
    pub files_discovered: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub chunks_created: usize,
    /// Chunks over the hard token ceiling, dropped without failing the file.
    pub chunks_dropped: usize,
    pub duration: Duration,
    pub failures: Vec<FileFailure>,
}

impl RunSummary {
    fn absorb(&mut self, report: &FileReport) {
        self.chunks_dropped += report.dropped;
        match &report.outcome {
            IngestionOutcome::Skipped => self.skipped += 1,
            IngestionOutcome::Processed { chunks } => {
                self.processed += 1;
                self.chunks_created += chunks;
            }
            IngestionOutcome::Failed { kind, message } => {
                self.errors += 1;
                self.failures.push(FileFailure {
                    path: report.path.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }
    }
}

/// Everything a file task hands back to the driving loop.
struct FileReport {
    path: PathBuf,
    outcome: IngestionOutcome,
    fingerprint: Option<FileFingerprint>,
    dropped: usize,
    duration: Duration,
}

impl FileReport {
    fn to_record(&self, session_id: &str) -> OutcomeRecord {
        let (chunk_count, error) = match &self.outcome {
            IngestionOutcome::Processed { chunks } => (Some(*chunks), None),
            IngestionOutcome::Failed { message, .. } => (None, Some(message.clone())),
            IngestionOutcome::Skipped => (None, None),
        };
        OutcomeRecord {
            timestamp: now_millis(),
            session_id: session_id.to_string(),
            path: self.path.to_string_lossy().to_string(),
            status: self.outcome.status(),
            chunk_count,
            error,
            duration_ms: self.duration.as_millis() as u64,
        }
    }
}

struct IngestedFile {
    chunks: usize,
    dropped: usize,
    fingerprint: FileFingerprint,
}

/// Chunks bounded by size, plus how many were dropped over the hard ceiling.
struct BoundedChunks {
    chunks: Vec<Chunk>,
    dropped: usize,
}

/// Drives discovery, change detection, chunking, embedding and storage
/// for a whole source tree.
pub struct IngestionPipeline {
    config: IngestConfig,
    parser: Arc<dyn SourceParser>,
    embedding: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    sink: Arc<dyn OutcomeSink>,
}

impl IngestionPipeline {
    pub fn new(
        config: IngestConfig,
        parser: Arc<dyn SourceParser>,
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            parser,
            embedding,
            store,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Ingest the configured root.
    ///
    /// Only an unreachable store (checked before any file is touched) or a
    /// failure to load/save the fingerprint cache aborts the run; every
    /// per-file failure becomes a classified outcome.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        self.config.validate()?;

        self.store
            .connect()
            .await
            .map_err(|e| IngestError::StoreUnavailable(format!("{:#}", e)))?;

        let mut tracker = ChangeTracker::load(self.config.cache_path.clone()).await?;
        let root = self
            .config
            .root
            .canonicalize()
            .with_context(|| format!("Failed to resolve root {}", self.config.root.display()))?;
        let files = self.discover(&root).await?;

        let mut summary = RunSummary {
            session_id: Uuid::new_v4().to_string(),
            files_discovered: files.len(),
            ..RunSummary::default()
        };
        tracing::info!(
            "Ingesting {} ({} files, batches of {}, {} concurrent)",
            root.display(),
            files.len(),
            self.config.batch_size,
            self.config.concurrency
        );

        for (index, batch) in files.chunks(self.config.batch_size).enumerate() {
            // Fan out, then wait for every task before touching shared state
            let reports: Vec<FileReport> = stream::iter(batch.iter().cloned())
                .map(|path| self.process_file(path, &root, &tracker))
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;

            for report in reports {
                self.sink.record(&report.to_record(&summary.session_id));
                summary.absorb(&report);
                if let Some(fingerprint) = report.fingerprint {
                    tracker.record(fingerprint);
                }
            }

            tracing::debug!(
                "Batch {} done: {} processed, {} skipped, {} errors so far",
                index + 1,
                summary.processed,
                summary.skipped,
                summary.errors
            );
        }

        tracker.save().await?;
        summary.duration = started.elapsed();

        tracing::info!(
            "Ingestion finished in {:.2?}: {} processed, {} skipped, {} errors, {} chunks ({} dropped)",
            summary.duration,
            summary.processed,
            summary.skipped,
            summary.errors,
            summary.chunks_created,
            summary.chunks_dropped
        );
        Ok(summary)
    }

    /// Forget a deleted file: drop its fingerprint and its stored chunks.
    /// Returns whether a fingerprint existed.
    ///
    /// Relative paths resolve against the run root. Fingerprints are keyed
    /// by canonical path, so `path` is canonicalized when it still exists.
    pub async fn forget(&self, path: &Path) -> Result<bool> {
        let root = self
            .config
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.config.root.clone());
        let path = tracked_path(&root, path);

        let mut tracker = ChangeTracker::load(self.config.cache_path.clone()).await?;
        let removed = tracker.remove(&path).is_some();

        self.store
            .delete_file(&relative_path(&root, &path))
            .await
            .context("Failed to delete rows from vector store")?;

        tracker.save().await?;
        Ok(removed)
    }

    async fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let extensions = if self.config.extensions.is_empty() {
            self.parser.extensions()
        } else {
            self.config.extensions.clone()
        };
        let discovery = FileDiscovery::new(&extensions, &self.config.exclude_dirs, self.config.max_depth);
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || discovery.discover(&root))
            .await
            .context("File discovery task failed")?
    }

    /// One file, end to end. Never fails: errors become the outcome.
    async fn process_file(&self, path: PathBuf, root: &Path, tracker: &ChangeTracker) -> FileReport {
        let started = Instant::now();

        if !self.config.force && !tracker.has_changed(&path).await {
            return FileReport {
                path,
                outcome: IngestionOutcome::Skipped,
                fingerprint: None,
                dropped: 0,
                duration: started.elapsed(),
            };
        }

        let previously_indexed = tracker.get(&path).is_some();
        match self.ingest_file(&path, root, previously_indexed).await {
            Ok(ingested) => FileReport {
                path,
                outcome: IngestionOutcome::Processed {
                    chunks: ingested.chunks,
                },
                fingerprint: Some(ingested.fingerprint),
                dropped: ingested.dropped,
                duration: started.elapsed(),
            },
            Err(e) => FileReport {
                path,
                outcome: IngestionOutcome::Failed {
                    kind: ErrorKind::of(&e),
                    message: format!("{:#}", e),
                },
                fingerprint: None,
                dropped: 0,
                duration: started.elapsed(),
            },
        }
    }

    async fn ingest_file(&self, path: &Path, root: &Path, previously_indexed: bool) -> Result<IngestedFile> {
        // Stat before reading: a write racing the read must look newer next run
        let last_modified = modified_millis(path).await?;
        let source = fs::read_to_string(path)
            .await
            .context("Failed to read source file")?;
        let file_hash = content_hash(source.as_bytes());

        let parser = self.parser.clone();
        let owned_path = path.to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&owned_path, Some(source)))
            .await
            .context("Parser task panicked")??;

        let relative = relative_path(root, path);
        let bounded = self.chunk(path, &relative, &parsed)?;

        // Embed before evicting so a failed embed leaves the old rows stored
        let vectors = self.embed(&bounded.chunks).await?;

        if previously_indexed && self.config.evict_stale {
            self.store
                .delete_file(&relative)
                .await
                .context("Failed to evict stale rows from vector store")?;
        }

        if !bounded.chunks.is_empty() {
            self.store
                .upsert(&bounded.chunks, &vectors)
                .await
                .context("Vector store upsert failed")?;
        }

        let chunk_count = bounded.chunks.len();
        Ok(IngestedFile {
            chunks: chunk_count,
            dropped: bounded.dropped,
            fingerprint: FileFingerprint {
                path: path.to_path_buf(),
                hash: file_hash,
                last_modified,
                chunk_count,
            },
        })
    }

    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self
            .embedding
            .embed_batch(&texts)
            .await
            .context("Embedding request failed")?;
        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding provider returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            );
        }

        Ok(embeddings.into_iter().map(|e| e.values).collect())
    }

    /// Extract, identify, split and bound the chunks of one parsed file.
    fn chunk(&self, path: &Path, relative: &str, parsed: &ParsedSource) -> Result<BoundedChunks> {
        let no_units = HashSet::new();
        let units = self.config.units_for(parsed.language).unwrap_or(&no_units);
        let file = SourceFile {
            absolute_path: path,
            relative_path: relative,
            language: parsed.language,
            source: &parsed.source,
        };

        let mut extracted = SemanticExtractor::new(units).extract(&parsed.tree, &file);
        if extracted.is_empty() {
            if parsed.has_error {
                return Err(IngestError::EmptyParseTree(path.to_path_buf()).into());
            }
            if self.config.whole_file_fallback {
                extracted.extend(whole_file_chunk(&file));
            }
        } else if parsed.has_error {
            tracing::warn!(
                "Recovered {} units from {} despite syntax errors",
                extracted.len(),
                relative
            );
        }

        let mut chunks = Vec::with_capacity(extracted.len());
        for chunk in assign_ids(extracted) {
            chunks.extend(split(chunk, self.config.max_chunk_size, self.config.chunk_overlap)?);
        }

        let before = chunks.len();
        chunks.retain(|chunk| {
            let tokens = estimate_tokens(&chunk.content);
            let keep = tokens <= self.config.hard_token_limit;
            if !keep {
                tracing::warn!(
                    "Dropping unembeddable {} in {} (lines {}-{}, ~{} tokens)",
                    chunk.metadata.kind.as_str(),
                    relative,
                    chunk.metadata.start_line,
                    chunk.metadata.end_line,
                    tokens
                );
            }
            keep
        });

        Ok(BoundedChunks {
            dropped: before - chunks.len(),
            chunks,
        })
    }
}

/// Path relative to the run root with forward slashes; the absolute path
/// when the file lies outside the root.
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// The key a discovered file is fingerprinted under.
fn tracked_path(root: &Path, path: &Path) -> PathBuf {
    let absolute = if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    };
    absolute.canonicalize().unwrap_or(absolute)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
