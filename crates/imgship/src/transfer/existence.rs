//! 🔍 ExistenceOracle — "is it already there?" asked once per key, remembered when the answer is yes.
//!
//! The store is append-only for the length of a run, so a positive answer never goes stale and
//! gets cached. A negative answer is never cached: the next job with that key asks again.
//! Two workers racing on the same key may both probe. That's a redundant HEAD, not a bug.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::trace;

use crate::backends::{ObjectStore, StoreBackend};
use crate::common::ErrorKind;
use crate::transfer::retry::AttemptError;

/// 💀 The existence check itself didn't work. Distinct from "not found".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("existence probe for '{key}' failed ({kind}): {cause}")]
pub struct ProbeError {
    pub key: String,
    pub kind: ErrorKind,
    pub cause: String,
}

#[derive(Debug)]
pub struct ExistenceOracle {
    store: Arc<StoreBackend>,
    present: RwLock<HashSet<String>>,
    probe_timeout: Duration,
}

impl ExistenceOracle {
    pub(crate) fn new(store: Arc<StoreBackend>, probe_timeout: Duration) -> Self {
        Self {
            store,
            present: RwLock::new(HashSet::new()),
            probe_timeout,
        }
    }

    /// 🔍 Whether the destination already holds `key`.
    ///
    /// Cache hits never touch the store. Misses do one bounded remote probe.
    /// No lock is held while the probe is in flight.
    pub async fn exists(&self, key: &str) -> Result<bool, ProbeError> {
        if self.present.read().await.contains(key) {
            trace!("🔍 cache hit for {}", key);
            return Ok(true);
        }

        let verdict = match tokio::time::timeout(self.probe_timeout, self.store.exists(key)).await {
            Ok(verdict) => verdict,
            Err(_) => Err(AttemptError::Transient(format!(
                "probe timed out after {:?}",
                self.probe_timeout
            ))),
        };

        match verdict {
            Ok(true) => {
                self.mark_present(key).await;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(error) => Err(ProbeError {
                key: key.to_string(),
                kind: error.kind(),
                cause: error.cause().to_string(),
            }),
        }
    }

    /// ✅ Records that `key` is present, e.g. after our own upload landed.
    pub async fn mark_present(&self, key: &str) {
        self.present.write().await.insert(key.to_string());
    }

    #[cfg(test)]
    pub(crate) async fn cached_len(&self) -> usize {
        self.present.read().await.len()
    }
}
