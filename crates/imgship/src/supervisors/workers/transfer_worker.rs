//! 🚚 The TransferWorker — pulls a job, asks if it's needed, waits for a slot, moves the bytes.
//!
//! Per job: `Queued → ExistenceCheck → {Skipped | Admitted} → Fetching → Uploading → done`.
//! Every job that gets a slot ends with exactly one recorded outcome, and the slot is released
//! only after that outcome is in the books. One job failing is one job failing. The loop moves on.
//!
//! ⚠️ The only error this worker returns is the admission gate itself breaking.
//! Everything per-job is an outcome, never an `Err`.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::Worker;
use crate::app_config::ProbeErrorPolicy;
use crate::common::{ErrorKind, SkipReason, Stage, TransferJob, TransferOutcome};
use crate::stats::StatsAggregator;
use crate::transfer::admission::AdmissionController;
use crate::transfer::existence::ExistenceOracle;
use crate::transfer::fetcher::HttpFetcher;
use crate::transfer::uploader::Uploader;

/// 🧰 Everything a transfer worker shares with its siblings. One per run, behind an `Arc`.
#[derive(Debug)]
pub(crate) struct TransferContext {
    pub(crate) oracle: ExistenceOracle,
    pub(crate) admission: AdmissionController,
    pub(crate) fetcher: HttpFetcher,
    pub(crate) uploader: Uploader,
    pub(crate) stats: Arc<StatsAggregator>,
    pub(crate) probe_error_policy: ProbeErrorPolicy,
    pub(crate) content_type: &'static str,
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug)]
pub(crate) struct TransferWorker {
    worker_id: usize,
    rx: Receiver<TransferJob>,
    context: Arc<TransferContext>,
}

impl TransferWorker {
    pub(crate) fn new(worker_id: usize, rx: Receiver<TransferJob>, context: Arc<TransferContext>) -> Self {
        Self {
            worker_id,
            rx,
            context,
        }
    }
}

impl Worker for TransferWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("🚚 TransferWorker {} reporting for duty", self.worker_id);
            while let Ok(job) = self.rx.recv().await {
                if self.context.cancel.is_cancelled() {
                    debug!("🚪 abandoning {} (run cancelled)", job.destination_key);
                    self.context.stats.record_abandoned();
                    continue;
                }
                self.context.handle(job).await?;
            }
            debug!("🏁 TransferWorker {}: queue closed and drained. Clocking out.", self.worker_id);
            Ok(())
        })
    }
}

impl TransferContext {
    async fn handle(&self, job: TransferJob) -> Result<()> {
        match self.oracle.exists(&job.destination_key).await {
            Ok(true) => {
                debug!("⏭️ {} already present, skipping", job.destination_key);
                self.stats.record(&TransferOutcome::Skipped {
                    reason: SkipReason::AlreadyPresent,
                });
                return Ok(());
            }
            Ok(false) => {}
            Err(probe_error) => match self.probe_error_policy {
                ProbeErrorPolicy::Fail => {
                    error!(
                        "💀 product {} → {} failed at probe ({}): {}",
                        job.product_id, job.destination_key, probe_error.kind, probe_error.cause
                    );
                    self.stats.record(&TransferOutcome::Failed {
                        stage: Stage::Probe,
                        error_kind: probe_error.kind,
                        last_attempt: 1,
                    });
                    return Ok(());
                }
                ProbeErrorPolicy::AttemptTransfer => {
                    warn!("🤷 {}; transferring anyway", probe_error);
                }
            },
        }

        let Some(slot) = self.admission.acquire(&self.cancel).await? else {
            debug!("🚪 abandoning {} (cancelled while waiting for a slot)", job.destination_key);
            self.stats.record_abandoned();
            return Ok(());
        };

        debug!(
            "🎟️ {} admitted ({} in flight)",
            job.destination_key,
            self.admission.in_flight()
        );
        let outcome = self.transfer(&job).await;
        self.stats.record(&outcome);
        drop(slot);
        Ok(())
    }

    /// 🚚 Fetch then upload. Runs only while holding an admission slot.
    async fn transfer(&self, job: &TransferJob) -> TransferOutcome {
        let started = Instant::now();

        let fetched = match self.fetcher.fetch(&job.source_locator, &self.cancel).await {
            Ok(fetched) => fetched,
            Err(fetch_error) => {
                error!("💀 product {} → {}: {}", job.product_id, job.destination_key, fetch_error);
                return TransferOutcome::Failed {
                    stage: Stage::Fetch,
                    error_kind: fetch_error.kind,
                    last_attempt: fetch_error.attempts,
                };
            }
        };

        if self.cancel.is_cancelled() {
            warn!("🛑 {} fetched but not uploaded: run cancelled", job.destination_key);
            return TransferOutcome::Failed {
                stage: Stage::Upload,
                error_kind: ErrorKind::Cancelled,
                last_attempt: 0,
            };
        }

        match self
            .uploader
            .upload(fetched.bytes, &job.destination_key, self.content_type, &self.cancel)
            .await
        {
            Ok(uploaded) => {
                self.oracle.mark_present(&job.destination_key).await;
                debug!(
                    "✅ {} uploaded ({} bytes, fetch attempts {}, upload attempts {})",
                    job.destination_key, uploaded.receipt.bytes_written, fetched.attempts, uploaded.attempts
                );
                TransferOutcome::Success {
                    bytes_written: uploaded.receipt.bytes_written,
                    duration: started.elapsed(),
                }
            }
            Err(upload_error) => {
                error!("💀 product {} → {}: {}", job.product_id, job.destination_key, upload_error);
                TransferOutcome::Failed {
                    stage: Stage::Upload,
                    error_kind: upload_error.kind,
                    last_attempt: upload_error.attempts,
                }
            }
        }
    }
}
