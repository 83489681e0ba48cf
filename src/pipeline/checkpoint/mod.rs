//! Checkpoint Storage
//!
//! Named snapshots of pipeline state, one per completed stage. A save at an
//! existing key replaces it; distinct keys stay around for listing and
//! audit until pruned.
//!
//! ## Backends
//!
//! - [`FileCheckpointStore`]: one pretty-printed JSON file per key
//! - [`SqliteCheckpointStore`]: a `checkpoints` table in the project database
//!
//! Every stored record carries a format version and a SHA-256 checksum of
//! its payload so that truncated or hand-edited snapshots are reported as
//! corrupt instead of resuming from garbage.

mod file_store;
mod sqlite_store;

pub use file_store::FileCheckpointStore;
pub use sqlite_store::SqliteCheckpointStore;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::constants::checkpoint::{FORMAT_VERSION, KEY_SEPARATOR};
use crate::pipeline::params::PipelineParams;
use crate::storage::Database;
use crate::types::{ForgeError, Result, StageKind, slugify};

// =============================================================================
// Records
// =============================================================================

/// Provider and parameters in force when the checkpoint was written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub stage_params: PipelineParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub key: String,
    /// Last completed stage
    pub stage: StageKind,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub metadata: CheckpointMetadata,
}

/// Listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub key: String,
    pub stage: StageKind,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            key: checkpoint.key.clone(),
            stage: checkpoint.stage,
            timestamp: checkpoint.timestamp,
            provider: checkpoint.metadata.provider.clone(),
            model: checkpoint.metadata.model.clone(),
        }
    }
}

/// On-disk envelope around a checkpoint
#[derive(Debug, Serialize, Deserialize)]
struct StoredCheckpoint {
    version: u32,
    checksum: String,
    #[serde(flatten)]
    checkpoint: Checkpoint,
}

impl StoredCheckpoint {
    fn seal(checkpoint: Checkpoint) -> Result<Self> {
        Ok(Self {
            version: FORMAT_VERSION,
            checksum: payload_checksum(&checkpoint.payload)?,
            checkpoint,
        })
    }

    /// Verify version and checksum, returning the checkpoint
    fn open(self, key: &str) -> Result<Checkpoint> {
        if self.version > FORMAT_VERSION {
            return Err(ForgeError::corrupt(
                key,
                format!(
                    "format version {} is newer than supported {}",
                    self.version, FORMAT_VERSION
                ),
            ));
        }
        let actual = payload_checksum(&self.checkpoint.payload)?;
        if actual != self.checksum {
            return Err(ForgeError::corrupt(key, "payload checksum mismatch"));
        }
        if self.checkpoint.key != key {
            return Err(ForgeError::corrupt(
                key,
                format!("record belongs to key '{}'", self.checkpoint.key),
            ));
        }
        Ok(self.checkpoint)
    }
}

/// Hex SHA-256 of the canonical JSON payload
fn payload_checksum(payload: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

// =============================================================================
// Keys
// =============================================================================

/// Fresh run key: `<project-slug>--<utc timestamp>-<random suffix>`
pub fn new_run_key(project_name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}{}{}-{}",
        slugify(project_name),
        KEY_SEPARATOR,
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        &suffix[..8]
    )
}

/// Project part of a key, used to group snapshots when pruning
pub fn project_prefix(key: &str) -> &str {
    key.rsplit_once(KEY_SEPARATOR)
        .map(|(prefix, _)| prefix)
        .unwrap_or(key)
}

/// Keys double as file names, so only a conservative character set is allowed
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ForgeError::Storage(format!(
            "Invalid checkpoint key '{}': use letters, digits, '-', '_' or '.'",
            key
        )))
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Durable checkpoint persistence
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot, replacing any snapshot at `key`
    async fn save(
        &self,
        key: &str,
        stage: StageKind,
        payload: Value,
        metadata: CheckpointMetadata,
    ) -> Result<Checkpoint>;

    /// `Ok(None)` when no snapshot exists; corrupt snapshots are errors
    async fn load(&self, key: &str) -> Result<Option<Checkpoint>>;

    /// All readable snapshots, newest first
    async fn list(&self) -> Result<Vec<CheckpointSummary>>;

    /// Returns whether a snapshot was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keep the newest `keep_latest_per_project` snapshots of each project
    async fn prune(&self, keep_latest_per_project: usize) -> Result<usize> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut removed = 0;

        for summary in self.list().await? {
            let count = seen
                .entry(project_prefix(&summary.key).to_string())
                .or_insert(0);
            *count += 1;
            if *count > keep_latest_per_project && self.delete(&summary.key).await? {
                debug!("Pruned checkpoint {}", summary.key);
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Pruned {} checkpoint(s)", removed);
        }
        Ok(removed)
    }
}

pub type SharedCheckpointStore = Arc<dyn CheckpointStore>;

/// Open the backend selected in configuration
pub fn open_store(config: &CheckpointConfig) -> Result<SharedCheckpointStore> {
    match config.backend {
        CheckpointBackend::File => Ok(Arc::new(FileCheckpointStore::new(config.dir.clone()))),
        CheckpointBackend::Sqlite => {
            if let Some(parent) = config.database.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let db = Database::open(&config.database)?;
            db.initialize()?;
            Ok(Arc::new(SqliteCheckpointStore::new(Arc::new(db))))
        }
    }
}

/// Build a checkpoint value for saving
fn new_checkpoint(
    key: &str,
    stage: StageKind,
    payload: Value,
    metadata: CheckpointMetadata,
) -> Checkpoint {
    Checkpoint {
        key: key.to_string(),
        stage,
        timestamp: Utc::now(),
        payload,
        metadata,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_key_shape() {
        let key = new_run_key("My App");
        assert!(key.starts_with("my-app--"));
        assert_eq!(project_prefix(&key), "my-app");
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn test_project_prefix_uses_last_separator() {
        assert_eq!(project_prefix("a--b--c"), "a--b");
        assert_eq!(project_prefix("plain"), "plain");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("ok-key_1.2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key(".hidden").is_err());
    }

    #[test]
    fn test_sealed_record_detects_tampering() {
        let checkpoint = new_checkpoint(
            "k--1",
            StageKind::Design,
            serde_json::json!({"a": 1}),
            store_tests::metadata("p"),
        );
        let mut stored = StoredCheckpoint::seal(checkpoint).unwrap();
        stored.checkpoint.payload = serde_json::json!({"a": 2});
        assert!(matches!(
            stored.open("k--1"),
            Err(ForgeError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn test_sealed_record_rejects_foreign_key() {
        let checkpoint = new_checkpoint(
            "k--1",
            StageKind::Design,
            serde_json::json!({}),
            store_tests::metadata("p"),
        );
        let stored = StoredCheckpoint::seal(checkpoint).unwrap();
        assert!(stored.open("other--1").is_err());
    }
}
