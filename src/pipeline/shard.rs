//! Final sharded output.
//!
//! Partitions the accumulated result set into contiguous fixed-size
//! shard files plus one manifest describing the partition. Deterministic
//! for a given result order and shard size; deduplication happened
//! upstream via the processed-id filter.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::BookRecord;

/// Writes shard files and the manifest.
pub struct ResultSink {
    dir: PathBuf,
    base_name: String,
    shard_size: usize,
}

/// Manifest describing one finalized partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub total_books: usize,
    pub files_count: usize,
    pub books_per_file: usize,
    pub date_created: String,
}

impl ResultSink {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>, shard_size: usize) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
            shard_size: shard_size.max(1),
        }
    }

    /// Write `ceil(len / shard_size)` shard files, 1-indexed, in the
    /// results' accumulation order, then the manifest.
    pub async fn finalize(&self, results: &[BookRecord]) -> Result<Manifest> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::persistence(self.dir.display().to_string(), e))?;

        for (index, shard) in results.chunks(self.shard_size).enumerate() {
            let path = self.shard_path(index + 1);
            write_json(&path, &shard).await?;
            log::info!("Shard {}: {} records -> {:?}", index + 1, shard.len(), path);
        }

        let manifest = Manifest {
            total_books: results.len(),
            files_count: results.len().div_ceil(self.shard_size),
            books_per_file: self.shard_size,
            date_created: Utc::now().format("%Y-%m-%d").to_string(),
        };
        write_json(&self.manifest_path(), &manifest).await?;
        log::info!(
            "Manifest written: {} records across {} shards",
            manifest.total_books,
            manifest.files_count
        );
        Ok(manifest)
    }

    pub fn shard_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}_{index}.json", self.base_name))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}_metadata.json", self.base_name))
    }
}

/// Atomic JSON write: to a temp file, then renamed into place.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let write = async {
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    };
    write
        .await
        .map_err(|e| AppError::persistence(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn records(count: usize) -> Vec<BookRecord> {
        (0..count)
            .map(|i| BookRecord {
                id: i.to_string(),
                ..BookRecord::default()
            })
            .collect()
    }

    fn read_shard(path: &Path) -> Vec<BookRecord> {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn partitions_into_full_and_remainder_shards() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::new(tmp.path(), "books", 10_000);

        let results = records(10_050);
        let manifest = sink.finalize(&results).await.unwrap();

        assert_eq!(manifest.total_books, 10_050);
        assert_eq!(manifest.files_count, 2);
        assert_eq!(manifest.books_per_file, 10_000);

        let first = read_shard(&sink.shard_path(1));
        let second = read_shard(&sink.shard_path(2));
        assert_eq!(first.len(), 10_000);
        assert_eq!(second.len(), 50);
        assert!(!sink.shard_path(3).exists());
    }

    #[tokio::test]
    async fn shard_concatenation_equals_input_order() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::new(tmp.path(), "books", 4);

        let results = records(10);
        sink.finalize(&results).await.unwrap();

        let mut concatenated = Vec::new();
        for index in 1..=3 {
            concatenated.extend(read_shard(&sink.shard_path(index)));
        }
        assert_eq!(concatenated, results);
    }

    #[tokio::test]
    async fn exact_multiple_produces_no_partial_shard() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::new(tmp.path(), "books", 5);

        let manifest = sink.finalize(&records(10)).await.unwrap();
        assert_eq!(manifest.files_count, 2);
        assert!(!sink.shard_path(3).exists());
    }

    #[tokio::test]
    async fn empty_results_write_manifest_only() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::new(tmp.path(), "books", 100);

        let manifest = sink.finalize(&[]).await.unwrap();
        assert_eq!(manifest.total_books, 0);
        assert_eq!(manifest.files_count, 0);
        assert!(!sink.shard_path(1).exists());
        assert!(sink.manifest_path().exists());
    }

    #[tokio::test]
    async fn manifest_round_trips() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::new(tmp.path(), "books", 3);

        let manifest = sink.finalize(&records(7)).await.unwrap();
        let loaded: Manifest =
            serde_json::from_slice(&std::fs::read(sink.manifest_path()).unwrap()).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.files_count, 3);
    }
}
