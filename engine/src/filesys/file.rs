//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::OrchestratorError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, OrchestratorError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, OrchestratorError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write JSON to file atomically, creating parent directories
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), OrchestratorError> {
        let contents = serde_json::to_vec_pretty(value)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.write_atomic(&contents).await
    }

    /// Copy this file over `target`, atomically
    pub async fn copy_to(&self, target: &File) -> Result<(), OrchestratorError> {
        let contents = fs::read(&self.path).await?;
        target.write_atomic(&contents).await
    }

    /// Atomic write using a temporary file
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), OrchestratorError> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_write_and_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("nested").join("report.json"));

        file.write_json(&json!({ "ok": true })).await.unwrap();
        assert!(file.exists().await);

        let value: Value = file.read_json().await.unwrap();
        assert_eq!(value, json!({ "ok": true }));
        assert!(!dir.path().join("nested").join("report.tmp").exists());
    }

    #[tokio::test]
    async fn test_copy_to_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let source = File::new(dir.path().join("a.json"));
        let target = File::new(dir.path().join("latest.json"));

        target.write_json(&json!({ "old": 1 })).await.unwrap();
        source.write_json(&json!({ "new": 2 })).await.unwrap();
        source.copy_to(&target).await.unwrap();

        let value: Value = target.read_json().await.unwrap();
        assert_eq!(value, json!({ "new": 2 }));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let file = File::new("/definitely/not/here.json");
        let err = file.read_json::<Value>().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::IoError(_)));
    }
}
