// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Key-value store for the latest-tag record
//!
//! The recorder overwrites one well-known key after every successful
//! publish; downstream consumers read it to find the latest image.
//! Writes are last-write-wins with no locking.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Record failure classification
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key-value store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("key '{key}' already exists and overwrite was not requested")]
    KeyExists { key: String },
}

/// Narrow interface to the key-value store
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Write `value` under `key`
    ///
    /// With `overwrite` the write is unconditional (last-write-wins); an
    /// existing key is otherwise left untouched and reported.
    async fn put(&self, key: &str, value: &str, overwrite: bool) -> Result<(), StoreError>;

    /// Read the current value for `key`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// JSON-file implementation of [`ParameterStore`]
///
/// One flat map per file. Remote stores plug in behind the trait.
pub struct FileParameterStore {
    path: PathBuf,
}

impl FileParameterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store file in the platform data directory
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "shipflow")
            .map(|dirs| dirs.data_dir().join("parameters.json"))
            .unwrap_or_else(|| PathBuf::from(".shipflow/parameters.json"))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| StoreError::Unavailable {
                    reason: format!("store file {} is corrupt: {}", self.path.display(), e),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Unavailable {
                reason: format!("cannot read {}: {}", self.path.display(), e),
            }),
        }
    }

    async fn save(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable {
                    reason: format!("cannot create {}: {}", parent.display(), e),
                })?;
        }

        let content = serde_json::to_string_pretty(map).map_err(|e| StoreError::Unavailable {
            reason: e.to_string(),
        })?;

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("cannot write {}: {}", self.path.display(), e),
            })
    }
}

#[async_trait]
impl ParameterStore for FileParameterStore {
    async fn put(&self, key: &str, value: &str, overwrite: bool) -> Result<(), StoreError> {
        let mut map = self.load().await?;

        if !overwrite && map.contains_key(key) {
            return Err(StoreError::KeyExists {
                key: key.to_string(),
            });
        }

        map.insert(key.to_string(), value.to_string());
        self.save(&map).await?;

        debug!(key, value, "parameter recorded");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load().await?.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_creates_file_and_parents() {
        let temp = TempDir::new().unwrap();
        let store = FileParameterStore::new(temp.path().join("state/params.json"));

        store.put("latest-tag", "20240115093000arm64", true).await.unwrap();

        assert_eq!(
            store.get("latest-tag").await.unwrap().as_deref(),
            Some("20240115093000arm64")
        );
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_value() {
        let temp = TempDir::new().unwrap();
        let store = FileParameterStore::new(temp.path().join("params.json"));

        store.put("latest-tag", "old", true).await.unwrap();
        store.put("latest-tag", "new", true).await.unwrap();

        assert_eq!(store.get("latest-tag").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_put_without_overwrite_reports_existing_key() {
        let temp = TempDir::new().unwrap();
        let store = FileParameterStore::new(temp.path().join("params.json"));

        store.put("latest-tag", "old", true).await.unwrap();
        let err = store.put("latest-tag", "new", false).await.unwrap_err();

        assert!(matches!(err, StoreError::KeyExists { .. }));
        assert_eq!(store.get("latest-tag").await.unwrap().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_unreachable_path_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-directory");
        tokio::fs::write(&blocker, b"file").await.unwrap();

        let store = FileParameterStore::new(blocker.join("params.json"));
        let err = store.put("latest-tag", "value", true).await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FileParameterStore::new(temp.path().join("params.json"));

        assert_eq!(store.get("absent").await.unwrap(), None);
    }
}
