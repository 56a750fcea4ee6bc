//! Crash-resumable checkpoint snapshots.
//!
//! A checkpoint is the entire accumulated result set serialized as one
//! JSON array, written to a sequence-numbered, timestamped file.
//! Checkpoints are cumulative, never merged and never deleted: the
//! newest file alone is the source of truth on restart, older ones stay
//! behind as history.
//!
//! ```text
//! checkpoints/
//! ├── checkpoint_000001_20260829T101500.json
//! ├── checkpoint_000002_20260829T104512.json
//! └── checkpoint_000003_20260829T112301.json   # loaded on restart
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::BookRecord;

const FILE_PREFIX: &str = "checkpoint_";
const FILE_SUFFIX: &str = ".json";

/// Durable store for cumulative result snapshots.
pub struct CheckpointStore {
    dir: PathBuf,
}

/// Prior progress reconstructed from the newest checkpoint.
#[derive(Debug, Default)]
pub struct LoadedState {
    /// Accumulated records, in their original accumulation order.
    pub records: Vec<BookRecord>,
    /// Ids already completed; used once to filter the work queue.
    pub processed_ids: HashSet<String>,
    /// Sequence number the next save should use.
    pub next_seq: u64,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reconstruct prior progress from the newest checkpoint.
    ///
    /// A missing directory, unparsable filenames, or a corrupt newest
    /// file all yield empty state with a warning; resuming from nothing
    /// is always safe.
    pub async fn load_latest(&self) -> LoadedState {
        let Some((seq, _, path)) = self.latest_entry().await else {
            log::info!("No checkpoint found in {:?}; starting fresh", self.dir);
            return LoadedState::default();
        };

        let records: Vec<BookRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Corrupt checkpoint {:?}: {}; starting fresh", path, e);
                    return LoadedState::default();
                }
            },
            Err(e) => {
                log::warn!("Unreadable checkpoint {:?}: {}; starting fresh", path, e);
                return LoadedState::default();
            }
        };

        let processed_ids = records.iter().map(|r| r.id.clone()).collect();
        log::info!(
            "Resuming from checkpoint {:?} with {} records",
            path,
            records.len()
        );
        LoadedState {
            records,
            processed_ids,
            next_seq: seq + 1,
        }
    }

    /// Write the entire accumulated result set as a new snapshot.
    ///
    /// Atomic via write-to-temp-then-rename. Callers treat a save error
    /// as non-fatal: it is logged and the run continues.
    pub async fn save(&self, records: &[BookRecord], seq: u64) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::persistence(self.dir.display().to_string(), e))?;

        let timestamp = Utc::now().format("%Y%m%dT%H%M%S");
        let path = self
            .dir
            .join(format!("{FILE_PREFIX}{seq:06}_{timestamp}{FILE_SUFFIX}"));
        let bytes = serde_json::to_vec_pretty(records)?;

        write_atomic(&path, &bytes)
            .await
            .map_err(|e| AppError::persistence(path.display().to_string(), e))?;

        log::info!("Checkpoint {} saved: {} records", seq, records.len());
        Ok(path)
    }

    /// Newest checkpoint by (sequence, timestamp), if any.
    pub async fn latest_entry(&self) -> Option<(u64, String, PathBuf)> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.ok()?;
        let mut latest: Option<(u64, String, PathBuf)> = None;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some((seq, timestamp)) = parse_file_name(&name.to_string_lossy()) else {
                continue;
            };
            let key = (seq, timestamp);
            if latest
                .as_ref()
                .is_none_or(|(s, t, _)| (key.0, key.1.as_str()) > (*s, t.as_str()))
            {
                latest = Some((key.0, key.1, entry.path()));
            }
        }
        latest
    }
}

/// Atomic write: to a temp file, then renamed into place.
async fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await
}

/// Parse `checkpoint_<seq>_<timestamp>.json` into its ordering key.
fn parse_file_name(name: &str) -> Option<(u64, String)> {
    let middle = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (seq, timestamp) = middle.split_once('_')?;
    Some((seq.parse().ok()?, timestamp.to_string()))
}
