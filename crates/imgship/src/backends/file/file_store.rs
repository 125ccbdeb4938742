use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::trace;

use crate::backends::{ObjectStore, UploadReceipt};
use crate::transfer::retry::AttemptError;

// -- 🪣 FileStoreConfig — a bucket, if the bucket were a folder on your laptop.
#[derive(Debug, Deserialize, Clone)]
pub struct FileStoreConfig {
    /// 📁 Directory that plays the part of the bucket. Keys become file names.
    pub directory: String,
    /// 🔧 Create the directory at startup if it's missing.
    #[serde(default = "default_create_directory")]
    pub create_directory: bool,
}

fn default_create_directory() -> bool {
    true
}

/// 📁 FileStore — an object store backed by a local directory.
///
/// Each put writes to a `.part` file and renames it over the key, so a retried put replaces
/// the object whole and a half-written file is never visible under the real name.
#[derive(Debug)]
pub(crate) struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub(crate) async fn new(config: FileStoreConfig) -> Result<Self> {
        let root = PathBuf::from(&config.directory);
        if config.create_directory {
            tokio::fs::create_dir_all(&root).await.context(format!(
                "💀 Couldn't create store directory '{}'. The filesystem said 'new phone who dis'.",
                config.directory
            ))?;
        }
        let metadata = tokio::fs::metadata(&root).await.context(format!(
            "💀 Store directory '{}' is not there and we weren't allowed to create it.",
            config.directory
        ))?;
        if !metadata.is_dir() {
            anyhow::bail!("💀 Store path '{}' exists but is not a directory.", config.directory);
        }
        Ok(Self { root })
    }

    /// 🔒 Keys are flat file names. Anything that could wander out of the directory is refused.
    fn path_for(&self, key: &str) -> Result<PathBuf, AttemptError> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
            return Err(AttemptError::Permanent(format!(
                "key '{}' is not a valid file name",
                key
            )));
        }
        Ok(self.root.join(key))
    }
}

fn classify_io(context: &str, error: std::io::Error) -> AttemptError {
    let cause = format!("{}: {}", context, error);
    match error.kind() {
        IoErrorKind::PermissionDenied | IoErrorKind::InvalidInput | IoErrorKind::NotFound => {
            AttemptError::Permanent(cause)
        }
        _ => AttemptError::Transient(cause),
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    async fn exists(&self, key: &str) -> Result<bool, AttemptError> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| classify_io("stat", e))
    }

    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<UploadReceipt, AttemptError> {
        let path = self.path_for(key)?;
        let part = self.root.join(format!(".{}.part", key));
        tokio::fs::write(&part, &bytes)
            .await
            .map_err(|e| classify_io("write", e))?;
        tokio::fs::rename(&part, &path)
            .await
            .map_err(|e| classify_io("rename", e))?;
        trace!("📁 wrote {} bytes to {}", bytes.len(), path.display());
        Ok(UploadReceipt {
            key: key.to_string(),
            bytes_written: bytes.len() as u64,
        })
    }
}
