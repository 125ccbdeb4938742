// AI
//! 📊 progress.rs — "Are we there yet?" — every pipeline, every time, forever.
//!
//! 🚀 This module answers the age-old question: "how many pictures have we moved?"
//! With cold hard numbers, a progress bar, and a table so comfy it has lumbar support.
//!
//! ⚠️  Warning: Watching this progress bar will not make the CDN go faster.
//! Neither will refreshing it. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::stats::LiveCounts;

// -- 📏 one mebibyte — not a megabyte, pedants. there's a difference and I will die on this hill.
const MIB: f64 = 1024.0 * 1024.0;

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 jobs" → "1,000,000 jobs" — you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📡 Throughput over the sliding window.
struct Rates {
    jobs_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 The brains behind the progress display. Fed by the progress worker, which samples
/// the stats atomics on a timer.
///
/// Uses a sliding 5-second window for rate calculations so spikes don't scare you.
pub(crate) struct ProgressMetrics {
    /// 🏷️ what are we even copying? a name to display in the UI
    source_name: String,
    latest: LiveCounts,
    progress_bar: ProgressBar,
    /// 🔄 sliding window of (timestamp, finished jobs, bytes) for rate calculation
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 custom Debug impl because ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("latest", &self.latest)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Spin up a new ProgressMetrics. `visible = false` draws nothing, but still does the math.
    pub(crate) fn new(source_name: String, visible: bool) -> Self {
        // -- 🎨 cyan because it's classy, blue because it's calm
        let progress_bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template("{msg}\n| [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        // -- 🔄 seed the rate window with t=0 so we don't divide by zero like animals
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            source_name,
            latest: LiveCounts::default(),
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Feed the display a fresh reading of the counters.
    ///
    /// The bar's length is "jobs discovered so far", so it grows while the source is still reading.
    pub(crate) fn update(&mut self, counts: LiveCounts) {
        self.latest = counts;
        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_length(counts.discovered.max(counts.finished()));
        self.progress_bar.set_position(counts.finished());
    }

    /// ✅ Mark the progress bar done. Ring the bell. We made it.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }

        let finished = self.latest.finished();
        let bytes = self.latest.bytes_written;
        self.rate_samples.push_back((now, finished, bytes));

        if let Some(&(oldest_time, oldest_finished, oldest_bytes)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                return Rates {
                    jobs_per_sec: finished.saturating_sub(oldest_finished) as f64 / elapsed,
                    mib_per_sec: bytes.saturating_sub(oldest_bytes) as f64 / elapsed / MIB,
                };
            }
        }

        // -- 💤 not enough elapsed time yet — return zeros and maintain composure
        Rates {
            jobs_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    /// 🎨 Render the full progress display as a comfy-table message on the progress bar.
    ///
    /// ```text
    /// | source: <name>
    ///   <jobs/s>       <finished / discovered>
    ///   <MiB/s>        <MiB written>
    ///   <ok/skip>      <failed>
    ///   <elapsed>
    /// ```
    fn render(&self, rates: Rates) {
        let counts = &self.latest;
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![
            Cell::new(format!("{:.1} jobs/s", rates.jobs_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} jobs",
                format_number(counts.finished()),
                format_number(counts.discovered)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2} MiB written", counts.bytes_written as f64 / MIB))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!(
                "{} ok, {} skipped",
                format_number(counts.succeeded),
                format_number(counts.skipped)
            ))
            .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} failed", format_number(counts.failed))).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(self.start_time.elapsed())))
                .set_alignment(CellAlignment::Right),
            Cell::new(""),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_their_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_durations_pick_their_shape() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_a_hidden_bar_still_does_the_math() {
        let mut metrics = ProgressMetrics::new("test".to_string(), false);
        metrics.update(LiveCounts {
            discovered: 10,
            succeeded: 4,
            skipped: 2,
            failed: 1,
            abandoned: 0,
            bytes_written: 4096,
        });
        assert_eq!(metrics.progress_bar.position(), 7);
        assert_eq!(metrics.progress_bar.length(), Some(10));
        metrics.finish();
    }
}
