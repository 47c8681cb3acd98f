//! Append-only JSONL run store.
//!
//! Every write appends one entry; the current view of each record is derived
//! by replaying the file. Writers hold an exclusive lock for the whole
//! read-validate-append cycle, so several processes can share one file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::runs::{RunQuery, RunStore, RunTable};
use super::StoreError;
use crate::domain::{RunRecord, RunStatus, WorkflowId};

/// One line of the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum RunLogEntry {
    /// A new record
    Created { record: RunRecord },

    /// Status change of an existing record
    Updated {
        id: Uuid,
        status: RunStatus,
        logs: Value,
        finished_at: Option<DateTime<Utc>>,
    },
}

#[derive(Serialize, Deserialize)]
struct LogLine {
    ts: DateTime<Utc>,
    #[serde(flatten)]
    entry: RunLogEntry,
}

/// Durable run store backed by a JSONL file
#[derive(Debug, Clone)]
pub struct JsonlRunStore {
    path: PathBuf,
}

impl JsonlRunStore {
    /// Create a store over a file (created on first write)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store, making sure the parent directory exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on the locked log file in a blocking task
    async fn with_locked_file<T, F>(&self, exclusive: bool, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut File) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(&path)?;

            if exclusive {
                FileExt::lock_exclusive(&file)?;
            } else {
                FileExt::lock_shared(&file)?;
            }

            // Lock is released when file is dropped
            f(&mut file)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Read the current state without taking a write lock
    async fn snapshot(&self) -> Result<RunTable, StoreError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(RunTable::default());
        }
        self.with_locked_file(false, replay).await
    }
}

/// Replay every entry of the log into a table
fn replay(file: &mut File) -> Result<RunTable, StoreError> {
    file.seek(SeekFrom::Start(0))?;
    let reader = BufReader::new(&*file);
    let mut table = RunTable::default();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        // A torn final line from a crashed writer must not poison the log
        let parsed: LogLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(line = number + 1, error = %e, "Skipping unreadable run log entry");
                continue;
            }
        };

        match parsed.entry {
            RunLogEntry::Created { record } => {
                let id = record.id;
                if table.insert(record).is_err() {
                    warn!(line = number + 1, run_id = %id, "Duplicate run in log, keeping first");
                }
            }
            RunLogEntry::Updated {
                id,
                status,
                logs,
                finished_at,
            } => {
                if !table.apply(id, status, logs, finished_at) {
                    warn!(line = number + 1, run_id = %id, "Update for unknown run in log");
                }
            }
        }
    }

    Ok(table)
}

fn append(file: &mut File, entry: RunLogEntry) -> Result<(), StoreError> {
    let line = LogLine {
        ts: Utc::now(),
        entry,
    };
    let json = serde_json::to_string(&line)?;
    writeln!(file, "{}", json)?;
    file.flush()?;
    Ok(())
}

#[async_trait]
impl RunStore for JsonlRunStore {
    async fn create(&self, record: &RunRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_locked_file(true, move |file| {
            let mut table = replay(file)?;
            table.insert(record.clone())?;
            append(file, RunLogEntry::Created { record })
        })
        .await
    }

    async fn update_status(&self, record: &RunRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_locked_file(true, move |file| {
            replay(file)?.check_update(&record)?;
            append(
                file,
                RunLogEntry::Updated {
                    id: record.id,
                    status: record.status,
                    logs: record.logs,
                    finished_at: record.finished_at,
                },
            )
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.snapshot().await?.get(id).cloned())
    }

    async fn list(&self, query: &RunQuery) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.snapshot().await?.select(query))
    }

    async fn count(
        &self,
        workflow_id: Option<WorkflowId>,
        status: Option<RunStatus>,
    ) -> Result<usize, StoreError> {
        Ok(self.snapshot().await?.count(workflow_id, status))
    }
}
