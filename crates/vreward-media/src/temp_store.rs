//! Scoped temporary media files.
//!
//! Every artifact is an exclusively owned file that disappears when its
//! handle is cleaned up or dropped, whichever comes first. Drop covers
//! error paths, panics and cancelled tasks.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

const DEFAULT_PREFIX: &str = "vreward-";

/// Factory for scoped temp files in one directory.
#[derive(Debug, Clone)]
pub struct TempMediaStore {
    dir: PathBuf,
    prefix: String,
}

impl Default for TempMediaStore {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl TempMediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty, writable file named `<prefix><random><suffix>`.
    pub fn acquire(&self, suffix: &str) -> MediaResult<TempArtifact> {
        std::fs::create_dir_all(&self.dir)?;

        let file = tempfile::Builder::new()
            .prefix(&self.prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)?;
        let (_file, path) = file.keep().map_err(|e| MediaError::Io(e.error))?;

        debug!(path = %path.display(), "Temp artifact acquired");
        Ok(TempArtifact {
            path,
            removed: false,
        })
    }

    /// Paths of artifacts currently present in the store directory.
    pub fn list(&self) -> MediaResult<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&self.prefix) {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Handle to one temp file; the file is removed when the handle goes away.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    removed: bool,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file for writing from the start.
    pub async fn writer(&self) -> MediaResult<tokio::fs::File> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await?;
        Ok(file)
    }

    /// Current size of the file in bytes.
    pub async fn size(&self) -> MediaResult<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Remove the file now. Failures are logged, never returned.
    pub async fn cleanup(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Temp artifact removed"),
            Err(e) => log_removal_error(&self.path, &e),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Temp artifact removed on drop"),
            Err(e) => log_removal_error(&self.path, &e),
        }
    }
}

fn log_removal_error(path: &Path, error: &std::io::Error) {
    if error.kind() != ErrorKind::NotFound {
        warn!(path = %path.display(), error = %error, "Failed to remove temp artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_acquire_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let store = TempMediaStore::new(dir.path());

        let artifact = store.acquire(".mp4").unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(".mp4"));

        let mut writer = artifact.writer().await.unwrap();
        writer.write_all(b"abc").await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(artifact.size().await.unwrap(), 3);

        artifact.cleanup().await;
        assert!(!path.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = TempMediaStore::new(dir.path());

        let path = {
            let artifact = store.acquire("_segmented.mp4").unwrap();
            assert_eq!(store.list().unwrap().len(), 1);
            artifact.path().to_path_buf()
        };

        assert!(!path.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_already_deleted_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = TempMediaStore::new(dir.path());

        let artifact = store.acquire(".mp4").unwrap();
        std::fs::remove_file(artifact.path()).unwrap();
        drop(artifact);
    }

    #[test]
    fn test_store_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = TempMediaStore::new(dir.path().join("nested/work"));
        assert!(store.list().unwrap().is_empty());

        let artifact = store.acquire(".bin").unwrap();
        assert!(artifact.path().starts_with(dir.path()));
    }
}
