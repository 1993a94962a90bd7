//! services/api/src/adapters/artifacts.rs
//!
//! This module contains the local filesystem artifact store used to park
//! inbound image payloads between acceptance and submission.
//! It implements the `ArtifactStore` port from the `core` crate.

use async_trait::async_trait;
use eco_report_core::ports::{ArtifactStore, PortError, PortResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// An artifact store backed by a single directory on the local filesystem.
#[derive(Clone)]
pub struct LocalArtifactStore {
    base_path: PathBuf,
}

impl LocalArtifactStore {
    /// Creates the store, making sure the base directory exists.
    pub async fn new(base_path: impl Into<PathBuf>) -> PortResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            PortError::Unexpected(format!(
                "failed to create uploads directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    fn resolve(&self, file_name: &str) -> PortResult<PathBuf> {
        // Reject anything that could escape the uploads directory.
        if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
            return Err(PortError::Unexpected(format!(
                "invalid artifact file name: {}",
                file_name
            )));
        }
        Ok(self.base_path.join(file_name))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn save(&self, file_name: &str, data: &[u8]) -> PortResult<PathBuf> {
        let path = self.resolve(file_name)?;
        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        file.write_all(data)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(path)
    }

    async fn delete(&self, path: &Path) -> PortResult<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path()).await.unwrap();

        let path = store.save("report_1.jpg", b"jpeg bytes").await.unwrap();
        assert!(path.exists());
        assert_eq!(fs::read(&path).await.unwrap(), b"jpeg bytes");

        store.delete(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn delete_of_missing_artifact_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path()).await.unwrap();
        let missing = dir.path().join("report_0.jpg");
        assert!(store.delete(&missing).await.is_err());
    }

    #[tokio::test]
    async fn traversal_file_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path()).await.unwrap();
        assert!(store.save("../evil.jpg", b"x").await.is_err());
    }
}
