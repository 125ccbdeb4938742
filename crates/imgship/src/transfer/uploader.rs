// ai
//! 📤 Uploader — puts the bytes where they belong, politely spaced.
//!
//! Same retry shape as the fetcher, with its own (bigger) timeout budget.
//! Every put attempt first waits its turn at the [`Pacer`], which keeps a minimum gap between
//! upload starts across ALL workers. The wait happens before the attempt's timeout starts,
//! is paid by the uploading worker only, and holds nothing anybody else needs.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::backends::{ObjectStore, StoreBackend, UploadReceipt};
use crate::common::ErrorKind;
use crate::transfer::retry::{RetryPolicy, retry_paced};

/// 💀 An upload that didn't make it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("upload of '{key}' ended {kind} after {attempts} attempt(s): {last_cause}")]
pub struct UploadError {
    pub kind: ErrorKind,
    pub key: String,
    pub attempts: u32,
    pub last_cause: String,
}

#[derive(Debug, Clone)]
pub struct Uploaded {
    pub receipt: UploadReceipt,
    pub attempts: u32,
}

/// ⏱️ Minimum spacing between upload starts, shared by every worker.
///
/// A governor limiter with one cell per `spacing` and no burst. Zero spacing means no limiter.
pub struct Pacer {
    spacing: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer").field("spacing", &self.spacing).finish()
    }
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            limiter: Quota::with_period(spacing).map(RateLimiter::direct),
        }
    }

    pub async fn wait_turn(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[derive(Debug)]
pub struct Uploader {
    store: Arc<StoreBackend>,
    policy: RetryPolicy,
    pacer: Pacer,
}

impl Uploader {
    pub(crate) fn new(store: Arc<StoreBackend>, policy: RetryPolicy, pacing: Duration) -> Self {
        Self {
            store,
            policy,
            pacer: Pacer::new(pacing),
        }
    }

    /// 📤 Writes `bytes` to `key`, retrying transient failures. Safe to retry because puts overwrite.
    pub async fn upload(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Uploaded, UploadError> {
        let what = format!("PUT {}", key);
        retry_paced(
            &self.policy,
            cancel,
            &what,
            || self.pacer.wait_turn(),
            |attempt| {
                let bytes = bytes.clone();
                async move {
                    trace!("📤 uploading {} ({} bytes, attempt {})", key, bytes.len(), attempt);
                    self.store.put(key, bytes, content_type).await
                }
            },
        )
        .await
        .map(|retried| Uploaded {
            receipt: retried.value,
            attempts: retried.attempts,
        })
        .map_err(|failure| UploadError {
            kind: failure.kind,
            key: key.to_string(),
            attempts: failure.attempts,
            last_cause: failure.last_cause,
        })
    }
}
