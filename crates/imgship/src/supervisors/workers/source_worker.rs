//! 🎬 *[a cursor opens. records trickle out. each one is holding a list of URLs.]*
//!
//! 🚰 The SourceWorker turns product records into transfer jobs and pushes them into the
//! bounded queue. When the queue is full it waits; that's the backpressure doing its job.
//! When the run is cancelled it stops reading and closes its end of the channel.

use anyhow::{Context, Result};
use async_channel::Sender;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Worker;
use crate::backends::{Source, SourceBackend};
use crate::common::TransferJob;
use crate::stats::StatsAggregator;

#[derive(Debug)]
pub(crate) struct SourceWorker {
    tx: Sender<TransferJob>,
    source: SourceBackend,
    image_extension: String,
    stats: Arc<StatsAggregator>,
    cancel: CancellationToken,
}

impl SourceWorker {
    pub(crate) fn new(
        tx: Sender<TransferJob>,
        source: SourceBackend,
        image_extension: String,
        stats: Arc<StatsAggregator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            source,
            image_extension,
            stats,
            cancel,
        }
    }
}

impl Worker for SourceWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("🚰 SourceWorker started reading records...");
            let mut records_read = 0u64;
            let mut jobs_queued = 0u64;

            'records: loop {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'records,
                    next = self.source.next_record() => next
                        .context("💀 SourceWorker couldn't read the next record. The cursor has left the chat.")?,
                };
                let Some(record) = next else {
                    break 'records;
                };
                records_read += 1;

                let record_id = record.id.clone();
                let jobs = record.into_jobs(&self.image_extension);
                if jobs.is_empty() {
                    debug!("🫥 record {:?} produced no jobs (no product id or no media URLs)", record_id);
                    continue;
                }

                for job in jobs {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break 'records,
                        sent = self.tx.send(job) => sent
                            .context("💀 Every transfer worker is gone, so nobody is left to take jobs.")?,
                    }
                    jobs_queued += 1;
                    self.stats.record_discovered(1);
                }
            }

            // -- 🏁 closing our end lets the workers drain what's queued and then stop
            self.tx.close();
            if records_read == 0 && !self.cancel.is_cancelled() {
                warn!("🫙 the source had no records at all. Nothing to ship.");
            }
            info!(
                "🏁 SourceWorker done: {} records read, {} jobs queued{}",
                records_read,
                jobs_queued,
                if self.cancel.is_cancelled() { " (cancelled)" } else { "" }
            );
            Ok(())
        })
    }
}
