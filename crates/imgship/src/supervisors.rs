//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module — part middle manager, part helicopter parent.
//!
//! It builds the backends, wires the queue, spawns one source worker, a pool of transfer
//! workers and a progress worker, then waits at the drain barrier: the source is exhausted
//! (or cancelled) AND every transfer worker has joined. Only then does it read the stats.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app_config::{AppConfig, RuntimeConfig, SourceConfig, StoreConfig};
use crate::backends::file::{FileSource, FileStore};
use crate::backends::gcs::GcsStore;
use crate::backends::in_mem::{InMemorySource, InMemoryStore};
use crate::backends::{SourceBackend, StoreBackend, content_type_for};
use crate::progress::ProgressMetrics;
use crate::stats::{RunSummary, StatsAggregator};
use crate::transfer::admission::AdmissionController;
use crate::transfer::existence::ExistenceOracle;
use crate::transfer::fetcher::HttpFetcher;
use crate::transfer::uploader::Uploader;
use workers::{ProgressWorker, SourceWorker, TransferContext, TransferWorker, Worker};

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
#[derive(Debug)]
pub(crate) struct Supervisor {
    runtime: RuntimeConfig,
    source_name: String,
    source: SourceBackend,
    store: Arc<StoreBackend>,
}

impl Supervisor {
    /// 🚀 Validates the knobs, then opens the source and the store.
    /// Nothing is admitted until all three have said yes.
    pub(crate) async fn from_config(app_config: AppConfig) -> Result<Self> {
        app_config
            .runtime
            .validate()
            .context("💀 The runtime config failed validation. Fix the knobs, then try again.")?;

        let (source_name, source) = match app_config.source_config {
            SourceConfig::File(config) => (
                config.file_name.clone(),
                SourceBackend::File(FileSource::new(config).await?),
            ),
            SourceConfig::InMemory { records } => (
                "in-memory".to_string(),
                SourceBackend::InMemory(InMemorySource::new(records)),
            ),
        };

        let store = match app_config.store_config {
            StoreConfig::Gcs(config) => StoreBackend::Gcs(
                GcsStore::new(config)
                    .await
                    .context("💀 The GCS store wouldn't open. Bucket missing, token rejected, or network sulking.")?,
            ),
            StoreConfig::File(config) => StoreBackend::File(FileStore::new(config).await?),
            StoreConfig::InMemory { existing_keys } => {
                StoreBackend::InMemory(InMemoryStore::with_existing(existing_keys))
            }
        };

        Ok(Self::with_backends(app_config.runtime, source_name, source, store))
    }

    pub(crate) fn with_backends(
        runtime: RuntimeConfig,
        source_name: String,
        source: SourceBackend,
        store: StoreBackend,
    ) -> Self {
        Self {
            runtime,
            source_name,
            source,
            store: Arc::new(store),
        }
    }

    /// 🧵 Runs the whole pipeline and returns the final summary.
    ///
    /// `cancel` is the outside world's big red button. A configured deadline presses it too.
    pub(crate) async fn run(self, cancel: CancellationToken) -> Result<RunSummary> {
        let runtime = self.runtime;
        runtime.validate()?;

        let stats = Arc::new(StatsAggregator::new());
        let admission = AdmissionController::new(runtime.max_concurrent_jobs);
        let context = Arc::new(TransferContext {
            oracle: ExistenceOracle::new(self.store.clone(), runtime.fetch_policy().attempt_timeout),
            admission: admission.clone(),
            fetcher: HttpFetcher::new(runtime.fetch_policy())?,
            uploader: Uploader::new(self.store.clone(), runtime.upload_policy(), runtime.upload_pacing()),
            stats: stats.clone(),
            probe_error_policy: runtime.probe_error_policy,
            content_type: content_type_for(&runtime.image_extension),
            cancel: cancel.clone(),
        });

        // -- 💣 the deadline is just another hand on the big red button
        let deadline_watch = runtime.deadline().map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        warn!("⏰ deadline of {:?} reached, cancelling the run", deadline);
                        cancel.cancel();
                    }
                }
            })
        });

        let worker_count = runtime.worker_count();
        info!(
            "🚀 starting run: {} slots, {} workers, queue {}, source '{}'",
            admission.capacity(),
            worker_count,
            runtime.queue_capacity,
            self.source_name
        );

        let (tx, rx) = async_channel::bounded(runtime.queue_capacity);
        let progress_done = CancellationToken::new();
        let progress_handle = ProgressWorker::new(
            ProgressMetrics::new(self.source_name.clone(), runtime.show_progress),
            stats.clone(),
            progress_done.clone(),
        )
        .start();

        let source_handle = SourceWorker::new(
            tx,
            self.source,
            runtime.image_extension.clone(),
            stats.clone(),
            cancel.clone(),
        )
        .start();

        let transfer_handles: Vec<_> = (0..worker_count)
            .map(|worker_id| TransferWorker::new(worker_id, rx.clone(), context.clone()).start())
            .collect();
        // -- 🔒 the workers hold the only receivers now, so a dead pool fails the source's send
        drop(rx);

        // -- 🚧 drain barrier
        let transfer_results = join_all(transfer_handles).await;
        let source_result = source_handle.await;
        stats.finish();
        progress_done.cancel();
        if let Some(deadline_watch) = deadline_watch {
            deadline_watch.abort();
        }
        progress_handle
            .await
            .context("💀 The progress worker panicked. The numbers are fine, the bar is not.")??;

        for result in transfer_results {
            result.context("💀 A transfer worker panicked. That's not a job failure, that's a bug.")??;
        }

        let summary = RunSummary {
            peak_in_flight: admission.peak_in_flight(),
            cancelled: cancel.is_cancelled(),
            ..stats.snapshot()
        };
        info!(
            "🏁 run finished: {} total, {} succeeded, {} skipped, {} failed, {} abandoned in {:.2}s",
            summary.total,
            summary.succeeded,
            summary.skipped,
            summary.failed,
            summary.abandoned,
            summary.elapsed_secs
        );
        if summary.accounted_for() != summary.total {
            warn!(
                "🧮 the books don't balance: {} jobs queued but only {} accounted for",
                summary.total,
                summary.accounted_for()
            );
        }

        source_result.context("💀 The source worker panicked.")??;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::ProbeErrorPolicy;
    use crate::backends::{FileSourceConfig, FileStoreConfig, GcsStoreConfig};
    use crate::common::ProductRecord;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_runtime(max_concurrent_jobs: usize) -> RuntimeConfig {
        RuntimeConfig {
            max_concurrent_jobs,
            retry_base_delay_ms: 1,
            upload_pacing_ms: 0,
            show_progress: false,
            ..RuntimeConfig::default()
        }
    }

    fn record(product_id: &str, url: String) -> ProductRecord {
        serde_json::from_value(serde_json::json!({
            "productId": product_id,
            "media": [{ "medium": url, "type": "front" }]
        }))
        .expect("💀 test record should parse")
    }

    async fn image_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex("^/img/.*"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
            .mount(&server)
            .await;
        server
    }

    fn in_memory(runtime: RuntimeConfig, records: Vec<ProductRecord>, store: &InMemoryStore) -> Supervisor {
        Supervisor::with_backends(
            runtime,
            "test".to_string(),
            SourceBackend::InMemory(InMemorySource::new(records)),
            StoreBackend::InMemory(store.clone()),
        )
    }

    #[tokio::test]
    async fn the_one_with_a_hundred_jobs_twenty_already_there_and_three_doomed() {
        let server = MockServer::start().await;
        for doomed in 0..3 {
            Mock::given(method("GET"))
                .and(path(format!("/img/doomed-{}.jpg", doomed)))
                .respond_with(ResponseTemplate::new(404))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path_regex("^/pre/.*"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex("^/img/ok-.*"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
            .expect(77)
            .mount(&server)
            .await;

        let mut records = Vec::new();
        let mut existing = Vec::new();
        for i in 0..100 {
            let product_id = format!("P{}", i);
            let url = if i < 20 {
                existing.push(format!("{}_front.jpg", product_id));
                format!("{}/pre/{}.jpg", server.uri(), i)
            } else if i < 23 {
                format!("{}/img/doomed-{}.jpg", server.uri(), i - 20)
            } else {
                format!("{}/img/ok-{}.jpg", server.uri(), i)
            };
            records.push(record(&product_id, url));
        }
        let store = InMemoryStore::with_existing(existing);
        let runtime = RuntimeConfig {
            worker_count: Some(25),
            ..test_runtime(10)
        };

        let summary = in_memory(runtime, records, &store)
            .run(CancellationToken::new())
            .await
            .expect("💀 the run itself should succeed");

        assert_eq!(summary.total, 100);
        assert_eq!(summary.accounted_for(), summary.total);
        assert_eq!(summary.succeeded, 77);
        assert_eq!(summary.skipped, 20);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.failed_fetch, 3);
        assert_eq!(summary.abandoned, 0);
        assert_eq!(summary.bytes_written, 77 * 8);
        assert!(summary.peak_in_flight <= 10, "peak was {}", summary.peak_in_flight);
        assert!(!summary.cancelled);
        assert_eq!(store.len().await, 97);
        assert_eq!(store.put_count(), 77);
    }

    #[tokio::test]
    async fn the_one_where_slow_images_never_push_past_the_gate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"JPEGDATA".to_vec())
                    .set_delay(Duration::from_millis(20)),
            )
            .mount(&server)
            .await;
        let records = (0..40)
            .map(|i| record(&format!("P{}", i), format!("{}/img/{}.jpg", server.uri(), i)))
            .collect();
        let store = InMemoryStore::new();
        let runtime = RuntimeConfig {
            worker_count: Some(16),
            ..test_runtime(3)
        };

        let summary = in_memory(runtime, records, &store)
            .run(CancellationToken::new())
            .await
            .expect("💀 run should succeed");

        assert_eq!(summary.succeeded, 40);
        assert!(summary.peak_in_flight <= 3, "peak was {}", summary.peak_in_flight);
        assert!(summary.peak_in_flight >= 1);
    }

    #[tokio::test]
    async fn the_one_where_someone_pulls_the_plug_mid_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"JPEGDATA".to_vec())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        let records = (0..50)
            .map(|i| record(&format!("P{}", i), format!("{}/img/{}.jpg", server.uri(), i)))
            .collect();
        let store = InMemoryStore::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let summary = in_memory(test_runtime(2), records, &store)
            .run(cancel)
            .await
            .expect("💀 a cancelled run still produces a summary");

        assert!(summary.cancelled);
        assert_eq!(summary.total, 50);
        assert_eq!(
            summary.succeeded + summary.skipped + summary.failed + summary.abandoned,
            summary.total
        );
        assert!(summary.abandoned >= 46, "abandoned was {}", summary.abandoned);
        assert!(summary.peak_in_flight <= 2);
        assert_eq!(store.put_count(), 0, "in-flight fetches finish, but nothing uploads after the plug is pulled");
    }

    #[tokio::test]
    async fn the_one_where_the_deadline_arrives_before_the_images_do() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"JPEGDATA".to_vec())
                    .set_delay(Duration::from_millis(1_500)),
            )
            .mount(&server)
            .await;
        let records = (0..10)
            .map(|i| record(&format!("P{}", i), format!("{}/img/{}.jpg", server.uri(), i)))
            .collect();
        let runtime = RuntimeConfig {
            deadline_secs: Some(1),
            ..test_runtime(2)
        };

        let summary = in_memory(runtime, records, &InMemoryStore::new())
            .run(CancellationToken::new())
            .await
            .expect("💀 a deadline is not an error");

        assert!(summary.cancelled);
        assert_eq!(summary.succeeded, 0);
        assert!(summary.abandoned >= 6);
        assert_eq!(summary.total, 10);
    }

    #[tokio::test]
    async fn the_one_where_the_source_is_empty_and_the_run_still_ends_politely() {
        let store = InMemoryStore::new();

        let summary = in_memory(test_runtime(4), Vec::new(), &store)
            .run(CancellationToken::new())
            .await
            .expect("💀 an empty source is a warning, not an error");

        assert_eq!(summary.total, 0);
        assert_eq!(summary.accounted_for(), 0);
        assert!(!summary.cancelled);
        assert_eq!(store.probe_count(), 0);
        assert_eq!(store.put_count(), 0);
    }

    async fn flaky_probe_server() -> MockServer {
        let server = image_server().await;
        Mock::given(method("HEAD"))
            .and(path("/bucket"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path_regex("^/bucket/.+"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        server
    }

    async fn gcs_supervisor(server: &MockServer, policy: ProbeErrorPolicy) -> Supervisor {
        let records = (0..5)
            .map(|i| record(&format!("P{}", i), format!("{}/img/{}.jpg", server.uri(), i)))
            .collect();
        let store = GcsStore::new(GcsStoreConfig {
            endpoint: server.uri(),
            bucket: "bucket".to_string(),
            access_token: None,
            service_account_path: None,
            service_account_key: None,
        })
        .await
        .expect("💀 store should open");
        Supervisor::with_backends(
            RuntimeConfig {
                probe_error_policy: policy,
                ..test_runtime(2)
            },
            "test".to_string(),
            SourceBackend::InMemory(InMemorySource::new(records)),
            StoreBackend::Gcs(store),
        )
    }

    #[tokio::test]
    async fn the_one_where_broken_probes_are_shrugged_off_by_default() {
        let server = flaky_probe_server().await;
        Mock::given(method("PUT"))
            .and(path_regex("^/bucket/.+"))
            .respond_with(ResponseTemplate::new(200))
            .expect(5)
            .mount(&server)
            .await;

        let summary = gcs_supervisor(&server, ProbeErrorPolicy::AttemptTransfer)
            .await
            .run(CancellationToken::new())
            .await
            .expect("💀 run should succeed");

        assert_eq!(summary.succeeded, 5);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn the_one_where_broken_probes_are_fatal_for_the_job_when_asked() {
        let server = flaky_probe_server().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let summary = gcs_supervisor(&server, ProbeErrorPolicy::Fail)
            .await
            .run(CancellationToken::new())
            .await
            .expect("💀 per-job failures never fail the run");

        assert_eq!(summary.failed, 5);
        assert_eq!(summary.failed_probe, 5);
        assert_eq!(summary.succeeded, 0);
    }

    #[tokio::test]
    async fn the_one_where_files_go_in_one_side_and_images_come_out_the_other() {
        let server = image_server().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let export = dir.path().join("export.ndjson");
        let lines: Vec<String> = (0..4)
            .map(|i| {
                serde_json::json!({
                    "_id": format!("doc-{}", i),
                    "productId": i,
                    "media": [
                        { "medium": format!("{}/img/{}-a.jpg", server.uri(), i), "type": "front" },
                        { "medium": format!("{}/img/{}-b.jpg", server.uri(), i) }
                    ]
                })
                .to_string()
            })
            .collect();
        std::fs::write(&export, lines.join("\n")).expect("write export");
        let bucket = dir.path().join("bucket");

        let app_config = AppConfig {
            source_config: SourceConfig::File(FileSourceConfig {
                file_name: export.to_string_lossy().into_owned(),
            }),
            store_config: StoreConfig::File(FileStoreConfig {
                directory: bucket.to_string_lossy().into_owned(),
                create_directory: true,
            }),
            runtime: test_runtime(4),
        };

        let summary = Supervisor::from_config(app_config)
            .await
            .expect("💀 supervisor should build")
            .run(CancellationToken::new())
            .await
            .expect("💀 run should succeed");

        assert_eq!(summary.succeeded, 8);
        assert!(bucket.join("0_front.jpg").exists());
        assert!(bucket.join("3_unknown.jpg").exists());
        assert_eq!(std::fs::read(bucket.join("2_front.jpg")).expect("read"), b"JPEGDATA");
    }

    #[tokio::test]
    async fn the_one_where_bad_knobs_stop_the_run_before_it_starts() {
        let app_config = AppConfig {
            source_config: SourceConfig::InMemory { records: Vec::new() },
            store_config: StoreConfig::InMemory {
                existing_keys: Vec::new(),
            },
            runtime: RuntimeConfig {
                max_attempts: 0,
                ..RuntimeConfig::default()
            },
        };
        assert!(Supervisor::from_config(app_config).await.is_err());
    }
}
