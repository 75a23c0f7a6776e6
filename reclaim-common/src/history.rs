//! Persistent retry ledger.
//!
//! The recovery engine is stateless; callers that outlive a single process
//! keep the returned [`RetryDirective`]s here, one JSON record per line, and
//! feed them back as the retry history of the next attempt.

use crate::recovery::RetryDirective;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions as AsyncOpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A directive as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRetry {
    pub recorded_at: DateTime<Utc>,
    pub directive: RetryDirective,
}

/// Append-only JSONL file of [`RecordedRetry`] entries.
#[derive(Debug, Clone)]
pub struct RetryLedger {
    path: PathBuf,
    records: Vec<RecordedRetry>,
}

impl RetryLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            debug!(path = %path.display(), "Retry ledger not found, starting empty");
            Ok(Self {
                path,
                records: Vec::new(),
            })
        }
    }

    /// Load the ledger from a JSONL file, skipping lines that fail to parse.
    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<RecordedRetry>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping invalid retry ledger line: {}", e);
                }
            }
        }

        debug!("Loaded {} retry records from {:?}", records.len(), path);

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[RecordedRetry] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Directives in recording order, ready to pass as retry history.
    pub fn directives(&self) -> Vec<RetryDirective> {
        self.records
            .iter()
            .map(|record| record.directive.clone())
            .collect()
    }

    /// Record a directive and persist it.
    pub async fn append(&mut self, directive: RetryDirective) -> std::io::Result<RecordedRetry> {
        let record = RecordedRetry {
            recorded_at: Utc::now(),
            directive,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = AsyncOpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let json = serde_json::to_string(&record)?;
        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        self.records.push(record.clone());
        Ok(record)
    }

    /// Forget every recorded directive, truncating the file.
    pub async fn clear(&mut self) -> std::io::Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            tokio::fs::write(&self.path, b"").await?;
        }
        self.records.clear();
        Ok(())
    }
}
