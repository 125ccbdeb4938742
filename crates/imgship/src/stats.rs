// ai
//! 🧮 Stats — the accountant who shows up at the end and asks where every job went.
//!
//! Workers call [`StatsAggregator::record`] from wherever they are, whenever they finish.
//! Every counter is an atomic, so there is nothing to lock and nothing to hold across I/O.
//! [`StatsAggregator::snapshot`] is read after the drain barrier, once every worker has joined.
//!
//! 🧠 Knowledge graph:
//! - one outcome per job → exactly one counter bump (succeeded | skipped | failed).
//! - `abandoned`: pulled off the queue after cancellation, never started. Not an outcome.
//! - `total`: every job the source queued, counted on the source side. After the drain barrier
//!   it must equal succeeded + skipped + failed + abandoned; a gap means a job went missing. 🦆

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use crate::common::{Stage, TransferOutcome};

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    failed_probe: AtomicU64,
    failed_fetch: AtomicU64,
    failed_upload: AtomicU64,
    abandoned: AtomicU64,
    discovered: AtomicU64,
    bytes_written: AtomicU64,
}

/// 📒 Thread-safe outcome accumulator. Share it behind an `Arc`.
#[derive(Debug)]
pub struct StatsAggregator {
    counters: Counters,
    started: Instant,
    finished: OnceLock<Instant>,
}

/// 📸 A live reading of the counters, for the progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveCounts {
    pub discovered: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub bytes_written: u64,
}

impl LiveCounts {
    pub fn finished(&self) -> u64 {
        self.succeeded + self.skipped + self.failed + self.abandoned
    }
}

/// 🏁 The run summary. Human-readable via `Display`, machine-readable via serde.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub failed_probe: u64,
    pub failed_fetch: u64,
    pub failed_upload: u64,
    pub abandoned: u64,
    pub bytes_written: u64,
    pub peak_in_flight: usize,
    pub elapsed_secs: f64,
    pub throughput_per_sec: f64,
    pub cancelled: bool,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            counters: Counters::default(),
            started: Instant::now(),
            finished: OnceLock::new(),
        }
    }

    /// ✍️ Records one terminal outcome. Safe from any worker, any time.
    pub fn record(&self, outcome: &TransferOutcome) {
        let c = &self.counters;
        match outcome {
            TransferOutcome::Success { bytes_written, .. } => {
                c.succeeded.fetch_add(1, Ordering::Relaxed);
                c.bytes_written.fetch_add(*bytes_written, Ordering::Relaxed);
            }
            TransferOutcome::Skipped { .. } => {
                c.skipped.fetch_add(1, Ordering::Relaxed);
            }
            TransferOutcome::Failed { stage, .. } => {
                c.failed.fetch_add(1, Ordering::Relaxed);
                let by_stage = match stage {
                    Stage::Probe => &c.failed_probe,
                    Stage::Fetch => &c.failed_fetch,
                    Stage::Upload => &c.failed_upload,
                };
                by_stage.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// 🚪 A job pulled off the queue after cancellation. Counted, but not as an outcome.
    pub fn record_abandoned(&self) {
        self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// 📬 A job derived by the source and queued.
    pub fn record_discovered(&self, jobs: u64) {
        self.counters.discovered.fetch_add(jobs, Ordering::Relaxed);
    }

    /// 🏁 Stamps the end time. Later calls keep the first stamp.
    pub fn finish(&self) {
        let _ = self.finished.set(Instant::now());
    }

    pub fn live(&self) -> LiveCounts {
        let c = &self.counters;
        LiveCounts {
            discovered: c.discovered.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
            bytes_written: c.bytes_written.load(Ordering::Relaxed),
        }
    }

    pub fn elapsed(&self) -> Duration {
        let end = self.finished.get().copied().unwrap_or_else(Instant::now);
        end.duration_since(self.started)
    }

    /// 📸 Point-in-time summary. Final only when taken after every worker has joined.
    /// `peak_in_flight` and `cancelled` belong to the supervisor, which fills them in.
    pub fn snapshot(&self) -> RunSummary {
        let c = &self.counters;
        let succeeded = c.succeeded.load(Ordering::Acquire);
        let skipped = c.skipped.load(Ordering::Acquire);
        let failed = c.failed.load(Ordering::Acquire);
        let abandoned = c.abandoned.load(Ordering::Acquire);
        let total = c.discovered.load(Ordering::Acquire);
        let elapsed_secs = self.elapsed().as_secs_f64();
        let throughput_per_sec = if elapsed_secs > 0.0 {
            total as f64 / elapsed_secs
        } else {
            0.0
        };

        RunSummary {
            total,
            succeeded,
            skipped,
            failed,
            failed_probe: c.failed_probe.load(Ordering::Acquire),
            failed_fetch: c.failed_fetch.load(Ordering::Acquire),
            failed_upload: c.failed_upload.load(Ordering::Acquire),
            abandoned,
            bytes_written: c.bytes_written.load(Ordering::Acquire),
            peak_in_flight: 0,
            elapsed_secs,
            throughput_per_sec,
            cancelled: false,
        }
    }
}

impl RunSummary {
    /// 🧾 Jobs that reached the books: succeeded + skipped + failed + abandoned.
    /// Equal to `total` once every worker has joined, unless something dropped a job.
    pub fn accounted_for(&self) -> u64 {
        self.succeeded + self.skipped + self.failed + self.abandoned
    }

    /// 🍽️ The summary as a two-column comfy-table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec!["run summary", ""]);
        let failed_detail = format!(
            "{} (probe {}, fetch {}, upload {})",
            self.failed, self.failed_probe, self.failed_fetch, self.failed_upload
        );
        let rows: Vec<(&str, String)> = vec![
            ("total", self.total.to_string()),
            ("succeeded", self.succeeded.to_string()),
            ("skipped", self.skipped.to_string()),
            ("failed", failed_detail),
            ("abandoned", self.abandoned.to_string()),
            ("bytes written", self.bytes_written.to_string()),
            ("peak in flight", self.peak_in_flight.to_string()),
            ("elapsed", format!("{:.2}s", self.elapsed_secs)),
            ("throughput", format!("{:.2} jobs/s", self.throughput_per_sec)),
            ("cancelled", self.cancelled.to_string()),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorKind, SkipReason};
    use std::sync::Arc;

    fn success(bytes: u64) -> TransferOutcome {
        TransferOutcome::Success {
            bytes_written: bytes,
            duration: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn the_one_where_sixteen_workers_hammer_the_counters_and_nothing_is_lost() {
        let stats = Arc::new(StatsAggregator::new());
        let handles: Vec<_> = (0..16)
            .map(|worker| {
                let stats = stats.clone();
                tokio::spawn(async move {
                    for i in 0..250u64 {
                        let outcome = match (worker + i) % 3 {
                            0 => success(10),
                            1 => TransferOutcome::Skipped {
                                reason: SkipReason::AlreadyPresent,
                            },
                            _ => TransferOutcome::Failed {
                                stage: Stage::Fetch,
                                error_kind: ErrorKind::Permanent,
                                last_attempt: 1,
                            },
                        };
                        stats.record(&outcome);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for handle in futures::future::join_all(handles).await {
            handle.expect("💀 task panicked");
        }
        stats.record_discovered(16 * 250);
        stats.finish();

        let summary = stats.snapshot();
        assert_eq!(summary.total, 16 * 250);
        assert_eq!(summary.succeeded + summary.skipped + summary.failed, summary.total);
        assert_eq!(summary.accounted_for(), summary.total);
        assert_eq!(summary.failed, summary.failed_fetch);
        assert_eq!(summary.bytes_written, summary.succeeded * 10);
    }

    #[test]
    fn the_one_where_abandoned_jobs_count_toward_total_but_not_outcomes() {
        let stats = StatsAggregator::new();
        stats.record_discovered(4);
        stats.record(&success(5));
        stats.record(&TransferOutcome::Failed {
            stage: Stage::Upload,
            error_kind: ErrorKind::Cancelled,
            last_attempt: 0,
        });
        stats.record_abandoned();
        stats.record_abandoned();
        stats.finish();

        let summary = stats.snapshot();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_upload, 1);
        assert_eq!(summary.abandoned, 2);
        assert_eq!(summary.accounted_for(), summary.total);
    }

    #[test]
    fn the_one_where_a_job_goes_missing_and_the_books_say_so() {
        let stats = StatsAggregator::new();
        stats.record_discovered(3);
        stats.record(&success(5));
        stats.record(&TransferOutcome::Skipped {
            reason: SkipReason::AlreadyPresent,
        });
        stats.finish();

        let summary = stats.snapshot();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.accounted_for(), 2);
    }

    #[test]
    fn the_one_where_the_end_time_is_written_once() {
        let stats = StatsAggregator::new();
        stats.finish();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        stats.finish();
        assert_eq!(stats.elapsed(), first);
    }

    #[test]
    fn the_one_where_the_summary_renders_and_serializes() {
        let summary = RunSummary {
            total: 100,
            succeeded: 77,
            skipped: 20,
            failed: 3,
            failed_probe: 0,
            failed_fetch: 3,
            failed_upload: 0,
            abandoned: 0,
            bytes_written: 7_700,
            peak_in_flight: 10,
            elapsed_secs: 2.0,
            throughput_per_sec: 50.0,
            cancelled: false,
        };
        let rendered = summary.to_string();
        assert!(rendered.contains("succeeded"));
        assert!(rendered.contains("77"));

        let json = serde_json::to_value(&summary).expect("💀 summary should serialize");
        assert_eq!(json["skipped"], 20);
        assert_eq!(json["throughput_per_sec"], 50.0);
    }
}
