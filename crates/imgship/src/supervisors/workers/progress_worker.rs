//! 📊 The ProgressWorker samples the stats atomics on a timer and repaints the display.
//! It never touches a job. It just watches, like a cat on a windowsill.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Worker;
use crate::progress::ProgressMetrics;
use crate::stats::StatsAggregator;

const REFRESH_EVERY: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub(crate) struct ProgressWorker {
    metrics: ProgressMetrics,
    stats: Arc<StatsAggregator>,
    /// 🏁 fired by the supervisor once the transfer workers have all joined
    done: CancellationToken,
}

impl ProgressWorker {
    pub(crate) fn new(metrics: ProgressMetrics, stats: Arc<StatsAggregator>, done: CancellationToken) -> Self {
        Self { metrics, stats, done }
    }
}

impl Worker for ProgressWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_EVERY);
            loop {
                tokio::select! {
                    _ = self.done.cancelled() => break,
                    _ = ticker.tick() => self.metrics.update(self.stats.live()),
                }
            }
            // -- 🎬 one last frame so the bar ends on the real numbers
            self.metrics.update(self.stats.live());
            self.metrics.finish();
            Ok(())
        })
    }
}
