//! Snapshot store writing a single JSON document on the local filesystem.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};

use super::SnapshotStore;
use crate::{
    dao::storage::{StorageError, StorageResult},
    state::timer::TimerState,
};

/// Failures raised while reading or writing the snapshot file.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// Reading the snapshot file failed for a reason other than absence.
    #[error("failed to read snapshot `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Writing, syncing or renaming the snapshot file failed.
    #[error("failed to write snapshot `{path}`")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The snapshot could not be encoded or decoded as JSON.
    #[error("invalid snapshot JSON in `{path}`")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<FileStoreError> for StorageError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::Json { .. } => StorageError::corrupt(err.to_string(), err),
            FileStoreError::Read { .. } | FileStoreError::Write { .. } => {
                StorageError::unavailable(err.to_string(), err)
            }
        }
    }
}

/// Stores the snapshot at a fixed path.
///
/// Writes go to a sibling temporary file which is synced and then renamed over the target,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: Arc<Path>,
}

impl FileSnapshotStore {
    /// Create a store for `path`. Parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self {
            path: Arc::from(path),
        }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        path.with_file_name(name)
    }

    async fn read(path: &Path) -> Result<Option<Value>, FileStoreError> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(FileStoreError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| FileStoreError::Json {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write(path: &Path, snapshot: &TimerState) -> Result<(), FileStoreError> {
        let write_err = |source| FileStoreError::Write {
            path: path.to_path_buf(),
            source,
        };
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| FileStoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let temp = Self::temp_path(path);
        let mut file = fs::File::create(&temp).await.map_err(write_err)?;
        file.write_all(&bytes).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        fs::rename(&temp, path).await.map_err(write_err)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let path = self.path.clone();
        Box::pin(async move { Ok(Self::read(&path).await?) })
    }

    fn save(&self, snapshot: TimerState) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        Box::pin(async move { Ok(Self::write(&path, &snapshot).await?) })
    }
}
