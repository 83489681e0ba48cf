//! JSON-file checkpoint backend
//!
//! One `<key>.json` file per snapshot. Writes go to a sibling temp file that
//! is renamed into place, so readers never observe a half-written record.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};

use super::{
    Checkpoint, CheckpointMetadata, CheckpointStore, CheckpointSummary, StoredCheckpoint,
    new_checkpoint, validate_key,
};
use crate::types::{ForgeError, Result, StageKind, log_filter_warn};

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    async fn read_record(&self, key: &str) -> Result<Option<Checkpoint>> {
        let path = self.record_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredCheckpoint = serde_json::from_str(&content)
            .map_err(|e| ForgeError::corrupt(key, format!("unreadable record: {}", e)))?;
        stored.open(key).map(Some)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(
        &self,
        key: &str,
        stage: StageKind,
        payload: Value,
        metadata: CheckpointMetadata,
    ) -> Result<Checkpoint> {
        validate_key(key)?;
        fs::create_dir_all(&self.dir).await?;

        let checkpoint = new_checkpoint(key, stage, payload, metadata);
        let stored = StoredCheckpoint::seal(checkpoint)?;
        let content = serde_json::to_string_pretty(&stored)?;

        let path = self.record_path(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        info!("Checkpoint saved: {} ({})", key, stage);
        Ok(stored.checkpoint)
    }

    async fn load(&self, key: &str) -> Result<Option<Checkpoint>> {
        validate_key(key)?;
        self.read_record(key).await
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_key(key).is_err() {
                continue;
            }

            let record = log_filter_warn(
                self.read_record(key).await,
                &format!("Skipping checkpoint {}", key),
            );
            if let Some(Some(checkpoint)) = record {
                summaries.push(CheckpointSummary::from(&checkpoint));
            }
        }

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.key.cmp(&a.key)));
        Ok(summaries)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => {
                debug!("Checkpoint deleted: {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::store_tests;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        store_tests::round_trip(&store).await;
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store_tests::missing_is_none(&store).await;
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_prune_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store_tests::list_prune_delete(&store).await;
    }

    #[tokio::test]
    async fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store
            .save(
                "proj--1",
                StageKind::Design,
                serde_json::json!({"design": "x"}),
                store_tests::metadata("p"),
            )
            .await
            .unwrap();

        let path = dir.path().join("proj--1.json");
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, &content[..content.len() / 2]).unwrap();

        let err = store.load("proj--1").await.unwrap_err();
        assert!(matches!(err, ForgeError::CheckpointCorrupt { .. }));

        // unreadable records are skipped by list
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store
            .save("a--1", StageKind::Handoff, serde_json::json!({}), store_tests::metadata("p"))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a--1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let result = store
            .save("../escape", StageKind::Design, serde_json::json!({}), store_tests::metadata("p"))
            .await;
        assert!(result.is_err());
    }
}
