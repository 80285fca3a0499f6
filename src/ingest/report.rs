//! Structured per-file outcome records and the sinks that receive them.

use super::errors::ErrorKind;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// One line of the ingestion log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    /// Unix milliseconds.
    pub timestamp: u64,
    pub session_id: String,
    pub path: String,
    pub status: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Receiver of outcome records; called from the orchestrator's driving
/// context only, never from file tasks.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: &OutcomeRecord);
}

/// Logs outcomes through `tracing`.
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn record(&self, record: &OutcomeRecord) {
        match record.status {
            ErrorKind::Success => tracing::info!(
                path = %record.path,
                chunks = record.chunk_count.unwrap_or(0),
                duration_ms = record.duration_ms,
                "Ingested file"
            ),
            ErrorKind::Skipped => tracing::debug!(path = %record.path, "Unchanged, skipped"),
            status => tracing::warn!(
                path = %record.path,
                %status,
                error = record.error.as_deref().unwrap_or(""),
                "Failed to ingest file"
            ),
        }
    }
}

/// Appends outcomes as JSON lines, and forwards them to tracing.
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open ingestion log {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl OutcomeSink for JsonLinesSink {
    fn record(&self, record: &OutcomeRecord) {
        TracingSink.record(record);

        let Ok(mut writer) = self.writer.lock() else {
            tracing::error!("Ingestion log writer poisoned");
            return;
        };
        let written = serde_json::to_string(record)
            .map_err(anyhow::Error::from)
            .and_then(|line| {
                writeln!(writer, "{}", line)?;
                writer.flush()?;
                Ok(())
            });
        if let Err(e) = written {
            tracing::error!("Failed to append to ingestion log: {}", e);
        }
    }
}
