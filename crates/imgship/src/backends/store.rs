use async_trait::async_trait;
use bytes::Bytes;

use crate::backends::{file, gcs, in_mem};
use crate::transfer::retry::AttemptError;

/// 🧾 Proof that an object landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub bytes_written: u64,
}

/// 🪣 The destination object store — pure I/O, zero logic.
///
/// # Contract 📜
/// - `exists` answers "is this key already there?". `Ok(false)` means "not found";
///   `Err` means the question itself couldn't be answered.
/// - `put` is an overwrite-by-key, never an append. Putting the same bytes twice leaves the
///   store exactly as one put would. Retries lean on this.
/// - Errors come pre-classified as transient or permanent so the retry loop knows what to do.
/// - `&self`, because one store is shared by every worker behind an `Arc`.
#[async_trait]
pub(crate) trait ObjectStore: std::fmt::Debug + Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, AttemptError>;
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<UploadReceipt, AttemptError>;
}

/// 🎭 Mirrors `SourceBackend` on the other end of the pipeline.
#[derive(Debug)]
pub(crate) enum StoreBackend {
    InMemory(in_mem::InMemoryStore),
    File(file::FileStore),
    Gcs(gcs::GcsStore),
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn exists(&self, key: &str) -> Result<bool, AttemptError> {
        match self {
            StoreBackend::InMemory(store) => store.exists(key).await,
            StoreBackend::File(store) => store.exists(key).await,
            StoreBackend::Gcs(store) => store.exists(key).await,
        }
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<UploadReceipt, AttemptError> {
        match self {
            StoreBackend::InMemory(store) => store.put(key, bytes, content_type).await,
            StoreBackend::File(store) => store.put(key, bytes, content_type).await,
            StoreBackend::Gcs(store) => store.put(key, bytes, content_type).await,
        }
    }
}

/// 🏷️ Content type for an image extension. Unknown extensions get the generic byte bucket.
pub fn content_type_for(image_extension: &str) -> &'static str {
    match image_extension
        .trim_start_matches('.')
        .to_ascii_lowercase()
        .as_str()
    {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_extensions_pick_their_content_type() {
        assert_eq!(content_type_for("jpg"), "image/jpeg");
        assert_eq!(content_type_for(".JPEG"), "image/jpeg");
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("tiff"), "application/octet-stream");
    }
}
