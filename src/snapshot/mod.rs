use crate::parser::identity::content_hash;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;

/// Version of the on-disk fingerprint document.
pub const CACHE_VERSION: u32 = 1;

/// On-disk fingerprint document, keyed by absolute path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintCache {
    pub version: u32,
    pub files: HashMap<String, FileEntry>,
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            files: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub hash: String,
    /// Unix milliseconds.
    pub last_modified: u64,
    pub chunk_count: usize,
}

/// Fingerprint of one ingested file, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub hash: String,
    pub last_modified: u64,
    pub chunk_count: usize,
}

impl FileFingerprint {
    /// Fingerprint from bytes already in hand. `last_modified` should be
    /// stat'ed before those bytes were read, so a write racing the read
    /// still looks newer next run.
    pub fn from_content(path: PathBuf, content: &[u8], last_modified: u64, chunk_count: usize) -> Self {
        Self {
            path,
            hash: content_hash(content),
            last_modified,
            chunk_count,
        }
    }
}

/// Tracks per-file fingerprints for incremental ingestion.
///
/// Loaded once before a run and saved once after it. Writes to the map go
/// through `&mut self`, so the orchestrator serializes them.
pub struct ChangeTracker {
    cache_path: PathBuf,
    cache: FingerprintCache,
}

impl ChangeTracker {
    /// Load the cache at `cache_path`. A missing file starts empty; a corrupt
    /// or foreign-version file is discarded with a warning, which only costs
    /// reprocessing.
    pub async fn load(cache_path: PathBuf) -> Result<Self> {
        let cache = if fs::try_exists(&cache_path).await.unwrap_or(false) {
            let data = fs::read_to_string(&cache_path)
                .await
                .context("Failed to read fingerprint cache")?;
            match serde_json::from_str::<FingerprintCache>(&data) {
                Ok(cache) if cache.version == CACHE_VERSION => cache,
                Ok(cache) => {
                    tracing::warn!(
                        "Ignoring fingerprint cache with version {} (expected {})",
                        cache.version,
                        CACHE_VERSION
                    );
                    FingerprintCache::default()
                }
                Err(e) => {
                    tracing::warn!("Ignoring unreadable fingerprint cache {}: {}", cache_path.display(), e);
                    FingerprintCache::default()
                }
            }
        } else {
            FingerprintCache::default()
        };

        tracing::debug!("Loaded {} fingerprints from {}", cache.files.len(), cache_path.display());
        Ok(Self { cache_path, cache })
    }

    /// Write the cache atomically (temp file, then rename).
    pub async fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.cache)?;

        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.cache_path.with_extension("json.tmp");
        fs::write(&tmp_path, data)
            .await
            .context("Failed to write fingerprint cache")?;
        fs::rename(&tmp_path, &self.cache_path)
            .await
            .context("Failed to replace fingerprint cache")?;
        Ok(())
    }

    /// True when the file has no fingerprint or its mtime is strictly newer
    /// than the recorded one. Only stats the file; content is never read
    /// here, so a touched-but-identical file counts as changed.
    pub async fn has_changed(&self, path: &Path) -> bool {
        let Some(entry) = self.get(path) else {
            return true;
        };

        match modified_millis(path).await {
            Ok(current) => current > entry.last_modified,
            // Unstat-able files go through processing and fail there
            Err(_) => true,
        }
    }

    /// Re-read the file, hash it, and store its fingerprint.
    pub async fn update(&mut self, path: &Path, chunk_count: usize) -> Result<()> {
        let last_modified = modified_millis(path).await?;
        let content = fs::read(path).await.context("Failed to read file for fingerprint")?;
        self.record(FileFingerprint::from_content(
            path.to_path_buf(),
            &content,
            last_modified,
            chunk_count,
        ));
        Ok(())
    }

    /// Store a fingerprint computed elsewhere, replacing any previous one.
    pub fn record(&mut self, fingerprint: FileFingerprint) {
        self.cache.files.insert(
            key(&fingerprint.path),
            FileEntry {
                hash: fingerprint.hash,
                last_modified: fingerprint.last_modified,
                chunk_count: fingerprint.chunk_count,
            },
        );
    }

    /// Forget a file, e.g. after it was deleted. Returns the old entry.
    pub fn remove(&mut self, path: &Path) -> Option<FileEntry> {
        self.cache.files.remove(&key(path))
    }

    pub fn get(&self, path: &Path) -> Option<&FileEntry> {
        self.cache.files.get(&key(path))
    }

    pub fn len(&self) -> usize {
        self.cache.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.files.is_empty()
    }
}

/// Modification time of `path` in unix milliseconds.
pub async fn modified_millis(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)
        .await
        .context("Failed to stat file")?
        .modified()
        .context("Modification time unavailable")?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .context("Modification time before unix epoch")?
        .as_millis();
    Ok(millis as u64)
}

fn key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn tempdir() -> tempfile::TempDir {
        tempfile::Builder::new().prefix("tracker").tempdir().unwrap()
    }

    fn bump_mtime(path: &Path, by: Duration) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + by).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_file_has_changed() {
        let dir = tempdir();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn a() {}").unwrap();

        let tracker = ChangeTracker::load(dir.path().join("cache.json")).await.unwrap();
        assert!(tracker.is_empty());
        assert!(tracker.has_changed(&file).await);
    }

    #[tokio::test]
    async fn test_update_converges() {
        let dir = tempdir();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn a() {}").unwrap();

        let mut tracker = ChangeTracker::load(dir.path().join("cache.json")).await.unwrap();
        assert!(tracker.has_changed(&file).await);

        tracker.update(&file, 3).await.unwrap();
        assert!(!tracker.has_changed(&file).await);

        let entry = tracker.get(&file).unwrap();
        assert_eq!(entry.chunk_count, 3);
        assert_eq!(entry.hash, content_hash(b"fn a() {}"));
    }

    #[tokio::test]
    async fn test_newer_mtime_counts_as_changed_even_with_same_bytes() {
        let dir = tempdir();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn a() {}").unwrap();

        let mut tracker = ChangeTracker::load(dir.path().join("cache.json")).await.unwrap();
        tracker.update(&file, 1).await.unwrap();

        bump_mtime(&file, Duration::from_secs(5));
        assert!(tracker.has_changed(&file).await);
    }

    #[tokio::test]
    async fn test_remove_forgets_file() {
        let dir = tempdir();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn a() {}").unwrap();

        let mut tracker = ChangeTracker::load(dir.path().join("cache.json")).await.unwrap();
        tracker.update(&file, 1).await.unwrap();
        assert!(tracker.remove(&file).is_some());
        assert!(tracker.has_changed(&file).await);
        assert!(tracker.remove(&file).is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload_roundtrip() {
        let dir = tempdir();
        let file = dir.path().join("a.rs");
        let cache_path = dir.path().join("nested").join("cache.json");
        std::fs::write(&file, "fn a() {}").unwrap();

        let mut tracker = ChangeTracker::load(cache_path.clone()).await.unwrap();
        tracker.update(&file, 2).await.unwrap();
        tracker.save().await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
        assert_eq!(raw["version"], CACHE_VERSION);
        let entry = &raw["files"][file.to_string_lossy().as_ref()];
        assert_eq!(entry["chunkCount"], 2);
        assert!(entry["lastModified"].is_u64());

        let reloaded = ChangeTracker::load(cache_path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded.has_changed(&file).await);
    }

    #[tokio::test]
    async fn test_corrupt_or_foreign_cache_starts_empty() {
        let dir = tempdir();
        let cache_path = dir.path().join("cache.json");

        std::fs::write(&cache_path, "{ not json").unwrap();
        assert!(ChangeTracker::load(cache_path.clone()).await.unwrap().is_empty());

        std::fs::write(&cache_path, r#"{"version": 99, "files": {"/x": {"hash": "h", "lastModified": 1, "chunkCount": 1}}}"#).unwrap();
        assert!(ChangeTracker::load(cache_path).await.unwrap().is_empty());
    }
}
