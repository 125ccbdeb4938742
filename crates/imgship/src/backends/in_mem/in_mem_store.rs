use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::backends::{ObjectStore, UploadReceipt};
use crate::transfer::retry::AttemptError;

/// 🖼️ One stored object: bytes plus the content type they were uploaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) struct StoredObject {
    pub(crate) bytes: Bytes,
    pub(crate) content_type: String,
}

/// 📦 An object store that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// A `HashMap` behind a `tokio::sync::Mutex` behind an `Arc`. Types all the way down.
/// Counts every probe and every put so tests can prove the pipeline didn't do work it shouldn't.
///
/// Clone-able because tests need to peek inside after handing a copy to the pipeline.
/// Every clone shares the same map and the same counters.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    probes: Arc<AtomicU64>,
    puts: Arc<AtomicU64>,
}

impl InMemoryStore {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 🌱 A store that already holds `keys` (with placeholder bytes). For "skip what's there" scenarios.
    pub(crate) fn with_existing<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let objects = keys
            .into_iter()
            .map(|key| {
                (
                    key.into(),
                    StoredObject {
                        bytes: Bytes::from_static(b"already here"),
                        content_type: "image/jpeg".to_string(),
                    },
                )
            })
            .collect();
        Self {
            objects: Arc::new(Mutex::new(objects)),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub(crate) async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, AttemptError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<UploadReceipt, AttemptError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let bytes_written = bytes.len() as u64;
        // -- 🔒 insert = overwrite. A retried put lands on the same slot, never next to it.
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(UploadReceipt {
            key: key.to_string(),
            bytes_written,
        })
    }
}
