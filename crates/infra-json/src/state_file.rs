// State File - shared persistence discipline for all JSON stores
//
// Writes go to a process-unique temp file, are fsync'd, then renamed over
// the target so interrupted processes never leave partial state. Unreadable
// files are moved aside with a timestamp suffix instead of being destroyed.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};

use jobfeed_core::{AppError, Result};

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read and parse the file. Missing file -> `None`. A file that exists
    /// but cannot be parsed is backed up and also reported as `None`: the
    /// caller starts fresh rather than aborting the pipeline.
    pub async fn read_value(&self) -> Result<Option<Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let backup = self.backup_corrupt().await?;
                error!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "state file is corrupt, backed it up and starting fresh"
                );
                Ok(None)
            }
        }
    }

    /// Atomic write: temp file in the same directory, fsync, rename.
    /// Any failure cleans up the temp file and propagates.
    pub async fn write_atomic<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.temp_path();
        let result = self.write_to_temp(&tmp, value).await;
        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(tmp = %tmp.display(), error = %cleanup, "failed to remove temp file");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn write_to_temp<T: Serialize + ?Sized>(&self, tmp: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(tmp, &self.path).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path
            .with_file_name(format!("{}.{}.tmp", name, std::process::id()))
    }

    /// Move the file aside with a timestamped `.corrupt-` suffix
    pub async fn backup_corrupt(&self) -> Result<PathBuf> {
        let suffix = chrono::Utc::now().timestamp();
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        let backup = self
            .path
            .with_file_name(format!("{name}.corrupt-{suffix}"));
        tokio::fs::rename(&self.path, &backup)
            .await
            .map_err(AppError::Io)?;
        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("jobfeed-state-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let file = StateFile::new(temp_dir().join("missing.json"));
        assert!(file.read_value().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let file = StateFile::new(temp_dir().join("data.json"));
        file.write_atomic(&json!({"a": 1})).await.unwrap();
        let value = file.read_value().await.unwrap().unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let file = StateFile::new(temp_dir().join("nested/deeper/data.json"));
        file.write_atomic(&json!([1, 2, 3])).await.unwrap();
        assert!(file.exists().await);
    }

    #[tokio::test]
    async fn corrupt_file_is_backed_up_not_fatal() {
        let dir = temp_dir();
        let path = dir.join("data.json");
        std::fs::write(&path, b"{not json").expect("write corrupt file");

        let file = StateFile::new(&path);
        assert!(file.read_value().await.unwrap().is_none());
        // Original is gone, a backup with the corrupt suffix exists
        assert!(!file.exists().await);
        let backups: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = temp_dir();
        let file = StateFile::new(dir.join("data.json"));
        file.write_atomic(&json!({"ok": true})).await.unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
