//! Append-only operation log with pending-id correlation and daily file
//! mirroring.
//!
//! Every attempted mutating dispatch appends a `pending` entry; a correlated
//! backend response appends a second, terminal entry (`success` or `failed`).
//! Entries are never mutated or deleted within a session — the log is the
//! audit trail and the data source for the sliding rate window.
//!
//! Correlation uses a pending-id map instead of scanning the whole log per
//! backend line, so lookup stays O(1) as the session grows.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// Status of a logged operation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Dispatched to the backend, no correlated response yet.
    Pending,
    /// Correlated response without an `error` member.
    Success,
    /// Correlated response carrying an `error` member.
    Failed,
}

/// One immutable operation log record.
///
/// Terminal (correlation) entries carry only `requestId` and `status`;
/// `method` and `tool` are omitted from the serialized form when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Creation time, RFC3339 UTC.
    pub timestamp: DateTime<Utc>,
    /// Correlation key of the request this entry belongs to.
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// JSON-RPC method, present on dispatch entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Tool name, present on dispatch entries for tool invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Entry status.
    pub status: OperationStatus,
}

/// Session statistics, emitted at shutdown.
///
/// Counts are per log entry, so a completed operation contributes one
/// `pending` and one terminal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
    pub last_hour: usize,
}

/// Append-only in-memory operation log.
#[derive(Debug, Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
    /// Request id → index of its uncorrelated dispatch entry.
    pending: HashMap<String, usize>,
    /// Indexes of dispatch entries whose correlated outcome was a failure.
    /// Those attempts no longer consume rate-window capacity. Keyed per
    /// entry, not per request id: a retry under a previously failed id is a
    /// fresh attempt and is charged again.
    failed_entries: HashSet<usize>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `pending` entry for an attempted dispatch.
    ///
    /// Returns a clone of the appended entry for file mirroring.
    pub fn append_pending(
        &mut self,
        request_id: String,
        method: Option<String>,
        tool: Option<String>,
        now: DateTime<Utc>,
    ) -> LogEntry {
        let entry = LogEntry {
            timestamp: now,
            request_id: request_id.clone(),
            method,
            tool,
            status: OperationStatus::Pending,
        };
        self.pending.insert(request_id, self.entries.len());
        self.entries.push(entry.clone());
        entry
    }

    /// Whether the given request id has a dispatch entry awaiting correlation.
    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Correlate a backend response against a pending dispatch entry.
    ///
    /// Appends a terminal entry and returns a clone of it, or `None` when the
    /// id is unknown or already correlated (status transitions at most once).
    pub fn correlate(
        &mut self,
        request_id: &str,
        failed: bool,
        now: DateTime<Utc>,
    ) -> Option<LogEntry> {
        let index = self.pending.remove(request_id)?;

        let status = if failed {
            self.failed_entries.insert(index);
            OperationStatus::Failed
        } else {
            OperationStatus::Success
        };
        let entry = LogEntry {
            timestamp: now,
            request_id: request_id.to_string(),
            method: None,
            tool: None,
            status,
        };
        self.entries.push(entry.clone());
        Some(entry)
    }

    /// Count of operations attempted in the trailing hour that still consume
    /// rate capacity.
    ///
    /// Each dispatch (`pending`) entry counts once unless that attempt's
    /// correlated outcome was a failure — failed capacity is refunded.
    /// Terminal entries are correlation records and are not counted.
    pub fn window_count(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(1);
        self.entries
            .iter()
            .enumerate()
            .rev()
            .take_while(|(_, e)| e.timestamp > cutoff)
            .filter(|(i, e)| {
                e.status == OperationStatus::Pending && !self.failed_entries.contains(i)
            })
            .count()
    }

    /// Per-entry session statistics.
    pub fn stats(&self, now: DateTime<Utc>) -> SessionStats {
        let cutoff = now - Duration::hours(1);
        SessionStats {
            total: self.entries.len(),
            successful: self
                .entries
                .iter()
                .filter(|e| e.status == OperationStatus::Success)
                .count(),
            failed: self
                .entries
                .iter()
                .filter(|e| e.status == OperationStatus::Failed)
                .count(),
            pending: self
                .entries
                .iter()
                .filter(|e| e.status == OperationStatus::Pending)
                .count(),
            last_hour: self
                .entries
                .iter()
                .filter(|e| e.timestamp > cutoff)
                .count(),
        }
    }

    /// All entries, in append order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

/// Daily JSONL file sink for log entries.
///
/// Files are named `operations-YYYY-MM-DD.jsonl` (UTC date) and append-only.
/// The file is opened per write — no handle is held across suspensions, so
/// interleaved tasks serialize through the filesystem's append semantics.
#[derive(Debug, Clone)]
pub struct LogFileSink {
    dir: PathBuf,
}

impl LogFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The file an entry with the given timestamp lands in.
    pub fn file_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("operations-{}.jsonl", timestamp.format("%Y-%m-%d")))
    }

    /// Append one entry as a JSONL line.
    pub async fn append(&self, entry: &LogEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(entry.timestamp))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
