//! Persistent per-job execution logs (JSONL).
//!
//! Each job appends structured entries to `<data_dir>/jobs/logs/<job_id>.jsonl`
//! so a run can be inspected after the process (or terminal) is gone.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::trainsh_data_dir;
use crate::error::AppError;
use crate::job::now_timestamp;
use crate::secrets::redact_secret_refs;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    System,
    Progress,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionLogEntry {
    pub timestamp: String,
    pub stream: LogStream,
    /// 0-based step index, if the entry belongs to a step
    #[serde(default)]
    pub step: Option<usize>,
    pub message: String,
}

pub fn default_logs_dir() -> PathBuf {
    trainsh_data_dir().join("jobs").join("logs")
}

/// Append-only log for one job.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    path: PathBuf,
}

impl ExecutionLog {
    pub fn new(dir: &Path, job_id: &str) -> Result<Self, AppError> {
        if job_id.trim().is_empty() {
            return Err(AppError::invalid_input("job_id is required"));
        }
        Ok(Self {
            path: dir.join(format!("{job_id}.jsonl")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &ExecutionLogEntry) -> Result<(), AppError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = serde_json::to_string(entry)?;
        f.write_all(line.as_bytes()).await?;
        f.write_all(b"\n").await?;
        Ok(())
    }

    /// Append a message; secret references in it are redacted first.
    pub async fn write(&self, stream: LogStream, step: Option<usize>, message: &str) -> Result<(), AppError> {
        self.append(&ExecutionLogEntry {
            timestamp: now_timestamp(),
            stream,
            step,
            message: redact_secret_refs(message),
        })
        .await
    }

    pub async fn read_entries(&self) -> Result<Vec<ExecutionLogEntry>, AppError> {
        read_entries(&self.path).await
    }
}

/// Read every entry; lines that are not valid JSON come back as `system` text.
pub async fn read_entries(path: &Path) -> Result<Vec<ExecutionLogEntry>, AppError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };
    let mut lines = BufReader::new(file).lines();
    let mut entries = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AppError::io(format!("Failed to read log file: {e}")))?
    {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ExecutionLogEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(_) => entries.push(ExecutionLogEntry {
                timestamp: now_timestamp(),
                stream: LogStream::System,
                step: None,
                message: trimmed.to_string(),
            }),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExecutionLog::new(&dir.path().join("logs"), "job1").unwrap();
        log.write(LogStream::Progress, Some(0), "Step 1/2: tmux.open @g as w").await.unwrap();
        log.write(LogStream::Stdout, Some(1), "curl -H ${secret:TOKEN} x").await.unwrap();
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .await
            .unwrap()
            .write_all(b"garbage\n")
            .await
            .unwrap();

        let entries = log.read_entries().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].stream, LogStream::Progress);
        assert_eq!(entries[0].step, Some(0));
        assert_eq!(entries[1].message, "curl -H [REDACTED] x");
        assert_eq!(entries[2].stream, LogStream::System);
        assert_eq!(entries[2].message, "garbage");
    }

    #[tokio::test]
    async fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_entries(&dir.path().join("none.jsonl")).await.unwrap().is_empty());
        assert!(ExecutionLog::new(dir.path(), " ").is_err());
    }
}
