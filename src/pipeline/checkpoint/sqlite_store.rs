//! SQLite checkpoint backend
//!
//! Rows in the `checkpoints` table; `INSERT OR REPLACE` makes a save at an
//! existing key an atomic overwrite.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info};

use super::{
    Checkpoint, CheckpointMetadata, CheckpointStore, CheckpointSummary, StoredCheckpoint,
    new_checkpoint, project_prefix, validate_key,
};
use crate::storage::SharedDatabase;
use crate::types::{ForgeError, Result, ResultExt, StageKind, log_filter_warn};

/// Raw row: stage, timestamp, version, checksum, payload, metadata
type CheckpointRow = (String, String, u32, String, String, String);

pub struct SqliteCheckpointStore {
    db: SharedDatabase,
}

impl SqliteCheckpointStore {
    /// The database must already be initialized
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    fn decode_row(key: &str, row: CheckpointRow) -> Result<Checkpoint> {
        let (stage, timestamp, version, checksum, payload, metadata) = row;
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            ForgeError::corrupt(key, format!("bad {}: {}", field, e))
        };

        let stage: StageKind = stage.parse().map_err(|e| corrupt("stage", &e))?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| corrupt("timestamp", &e))?
            .with_timezone(&Utc);
        let payload: Value = serde_json::from_str(&payload).map_err(|e| corrupt("payload", &e))?;
        let metadata: CheckpointMetadata =
            serde_json::from_str(&metadata).map_err(|e| corrupt("metadata", &e))?;

        StoredCheckpoint {
            version,
            checksum,
            checkpoint: Checkpoint {
                key: key.to_string(),
                stage,
                timestamp,
                payload,
                metadata,
            },
        }
        .open(key)
    }

    fn fetch(&self, key: &str) -> Result<Option<CheckpointRow>> {
        let conn = self.db.connection()?;
        conn.query_row(
            "SELECT stage, timestamp, version, checksum, payload, metadata
             FROM checkpoints WHERE key = ?1",
            params![key],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()
        .with_context_fn(|| format!("Failed to load checkpoint {}", key))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(
        &self,
        key: &str,
        stage: StageKind,
        payload: Value,
        metadata: CheckpointMetadata,
    ) -> Result<Checkpoint> {
        validate_key(key)?;
        let stored = StoredCheckpoint::seal(new_checkpoint(key, stage, payload, metadata))?;
        let payload_json = serde_json::to_string(&stored.checkpoint.payload)?;
        let metadata_json = serde_json::to_string(&stored.checkpoint.metadata)?;
        let timestamp = stored
            .checkpoint
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true);

        self.db.execute(
            "INSERT OR REPLACE INTO checkpoints
             (key, project, stage, timestamp, version, checksum, payload, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key,
                project_prefix(key),
                stage.as_str(),
                timestamp,
                stored.version,
                stored.checksum,
                payload_json,
                metadata_json,
            ],
        )?;

        info!("Checkpoint saved: {} ({})", key, stage);
        Ok(stored.checkpoint)
    }

    async fn load(&self, key: &str) -> Result<Option<Checkpoint>> {
        validate_key(key)?;
        match self.fetch(key)? {
            Some(row) => Self::decode_row(key, row).map(Some),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let rows: Vec<(String, CheckpointRow)> = {
            let conn = self.db.connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT key, stage, timestamp, version, checksum, payload, metadata
                     FROM checkpoints",
                )
                .with_context("Failed to list checkpoints")?;
            let mapped = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        (
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ),
                    ))
                })
                .with_context("Failed to list checkpoints")?;
            mapped
                .filter_map(|r| log_filter_warn(r, "Skipping checkpoint row"))
                .collect()
        };

        let mut summaries: Vec<CheckpointSummary> = rows
            .into_iter()
            .filter_map(|(key, row)| {
                log_filter_warn(
                    Self::decode_row(&key, row),
                    &format!("Skipping checkpoint {}", key),
                )
            })
            .map(|checkpoint| CheckpointSummary::from(&checkpoint))
            .collect();

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.key.cmp(&a.key)));
        Ok(summaries)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let removed = self
            .db
            .execute("DELETE FROM checkpoints WHERE key = ?1", params![key])?;
        if removed > 0 {
            debug!("Checkpoint deleted: {}", key);
        }
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::store_tests;
    use super::*;
    use crate::storage::Database;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn memory_store() -> (SqliteCheckpointStore, SharedDatabase) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        (SqliteCheckpointStore::new(db.clone()), db)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (store, _) = memory_store();
        store_tests::round_trip(&store).await;
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let (store, _) = memory_store();
        store_tests::missing_is_none(&store).await;
    }

    #[tokio::test]
    async fn test_list_prune_delete() {
        let (store, _) = memory_store();
        store_tests::list_prune_delete(&store).await;
    }

    #[tokio::test]
    async fn test_tampered_row_is_corrupt() {
        let (store, db) = memory_store();
        store
            .save(
                "proj--1",
                StageKind::PlanDetail,
                serde_json::json!({"plan": [1]}),
                store_tests::metadata("p"),
            )
            .await
            .unwrap();

        db.execute(
            "UPDATE checkpoints SET payload = ?1 WHERE key = ?2",
            params!["{\"plan\":[2]}", "proj--1"],
        )
        .unwrap();

        let err = store.load("proj--1").await.unwrap_err();
        assert!(matches!(err, ForgeError::CheckpointCorrupt { .. }));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("forge.db");
        {
            let db = Arc::new(Database::open(&path).unwrap());
            db.initialize().unwrap();
            SqliteCheckpointStore::new(db)
                .save("p--1", StageKind::Handoff, serde_json::json!({"x": 1}), store_tests::metadata("p"))
                .await
                .unwrap();
        }

        let db = Arc::new(Database::open(&path).unwrap());
        db.initialize().unwrap();
        let loaded = SqliteCheckpointStore::new(db).load("p--1").await.unwrap().unwrap();
        assert_eq!(loaded.stage, StageKind::Handoff);
        assert_eq!(loaded.payload, serde_json::json!({"x": 1}));
    }
}
