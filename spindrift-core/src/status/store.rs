//! Durable state store: a JSON map of info hash to last-known status.
//!
//! Written via temp-file-then-rename so a concurrent reader never observes
//! a partial write. A missing file loads as an empty map.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::fs;

use super::DownloadStatus;
use crate::config::StoreConfig;
use crate::magnet::InfoHash;

/// Errors from reading or writing the durable state file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file corrupt: {reason}")]
    Corrupt { reason: String },
}

/// On-disk snapshot of download state, keyed by hex info hash.
pub struct StateStore {
    path: PathBuf,
    temp_suffix: &'static str,
}

impl StateStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: config.state_file.clone(),
            temp_suffix: config.temp_file_suffix,
        }
    }

    /// Loads all persisted records; a missing file yields an empty map.
    ///
    /// # Errors
    /// - `StoreError::Corrupt` - File exists but is not a valid status map
    pub async fn load(&self) -> Result<HashMap<InfoHash, DownloadStatus>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            reason: e.to_string(),
        })
    }

    /// Writes the full map atomically (temp file, then rename).
    pub async fn save(
        &self,
        records: &HashMap<InfoHash, DownloadStatus>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records).map_err(|e| StoreError::Corrupt {
            reason: e.to_string(),
        })?;

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(self.temp_suffix);
        let temp_path = PathBuf::from(temp_path);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        fs::write(&temp_path, &json).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Read-modify-write upsert of a single record.
    ///
    /// The map is keyed by info hash, so a second upsert for the same hash
    /// replaces rather than duplicates.
    pub async fn upsert(&self, status: &DownloadStatus) -> Result<(), StoreError> {
        let mut records = self.load().await?;
        records.insert(status.info_hash, status.clone());
        self.save(&records).await
    }

    /// Deletes one record; returns whether it existed.
    pub async fn delete(&self, info_hash: InfoHash) -> Result<bool, StoreError> {
        let mut records = self.load().await?;
        let existed = records.remove(&info_hash).is_some();
        if existed {
            self.save(&records).await?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{DownloadState, test_status};

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            state_file: dir.path().join("state.json"),
            temp_file_suffix: ".tmp",
        };
        (dir, StateStore::new(&config))
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let (_dir, store) = temp_store();
        let records = store.load().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_and_load_roundtrip() {
        let (_dir, store) = temp_store();
        let status = test_status(7, DownloadState::Paused);

        store.upsert(&status).await.unwrap();
        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.get(&status.info_hash), Some(&status));

        // Upserting the same hash replaces the record.
        let mut done = status.clone();
        done.state = DownloadState::Done;
        done.progress = 1.0;
        store.upsert(&done).await.unwrap();

        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.get(&status.info_hash).unwrap().state, DownloadState::Done);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = temp_store();
        let status = test_status(2, DownloadState::Done);
        store.upsert(&status).await.unwrap();

        assert!(store.delete(status.info_hash).await.unwrap());
        assert!(!store.delete(status.info_hash).await.unwrap());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_file() {
        let (dir, store) = temp_store();
        store
            .upsert(&test_status(1, DownloadState::Paused))
            .await
            .unwrap();

        assert!(dir.path().join("state.json").exists());
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_reports_error() {
        let (dir, store) = temp_store();
        tokio::fs::write(dir.path().join("state.json"), b"not json")
            .await
            .unwrap();

        assert!(matches!(
            store.load().await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
