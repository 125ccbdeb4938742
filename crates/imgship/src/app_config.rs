//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `AppConfig` = where records come from + where images go + how hard to push.
//! - `RuntimeConfig` is validated ONCE, before the first job is admitted. After that it's read-only.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

pub use crate::backends::{FileSourceConfig, FileStoreConfig, GcsStoreConfig};
use crate::common::ProductRecord;
use crate::transfer::retry::RetryPolicy;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the product records come from.
    pub source_config: SourceConfig,
    /// 🪣 Where the images end up.
    #[serde(alias = "sink_config")]
    pub store_config: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🚰 Record sources. Externally tagged, so TOML reads `[source_config.File]`.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    File(FileSourceConfig),
    InMemory {
        #[serde(default)]
        records: Vec<ProductRecord>,
    },
}

/// 🪣 Destination stores. `[store_config.Gcs]`, `[store_config.File]` or `[store_config.InMemory]`.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    Gcs(GcsStoreConfig),
    File(FileStoreConfig),
    InMemory {
        /// 🌱 Keys that count as already uploaded.
        #[serde(default)]
        existing_keys: Vec<String>,
    },
}

/// 🤷 What to do with a job whose existence probe blew up.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorPolicy {
    /// Treat existence as unknown and transfer anyway. Puts overwrite, so the worst case is a redundant copy.
    #[default]
    AttemptTransfer,
    /// Record the job as failed at the probe stage.
    Fail,
}

/// 🎛️ The knobs. Every one of them has a default, so an empty `[runtime]` is a valid `[runtime]`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 🚦 Admission capacity N. At most this many jobs fetch/upload at once.
    #[serde(default = "default_max_concurrent_jobs", alias = "max_concurrent_tasks")]
    pub max_concurrent_jobs: usize,
    /// 🧵 Transfer workers draining the queue. Defaults to `max_concurrent_jobs`.
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// 📬 Bounded channel between the record reader and the workers.
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
    /// 🔄 Total attempts per network leg, first one included.
    #[serde(default = "default_max_attempts", alias = "max_retries")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// ⏱️ Minimum gap between upload starts. 0 turns pacing off.
    #[serde(default = "default_upload_pacing_ms")]
    pub upload_pacing_ms: u64,
    #[serde(default)]
    pub probe_error_policy: ProbeErrorPolicy,
    /// 💣 Hard wall-clock deadline for the whole run.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_max_concurrent_jobs() -> usize {
    10
}
fn default_queue_capacity() -> usize {
    64
}
fn default_fetch_timeout_ms() -> u64 {
    30_000
}
fn default_upload_timeout_ms() -> u64 {
    60_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    2_000
}
fn default_upload_pacing_ms() -> u64 {
    100
}
fn default_image_extension() -> String {
    "jpg".to_string()
}
fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            worker_count: None,
            queue_capacity: default_queue_capacity(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            upload_pacing_ms: default_upload_pacing_ms(),
            probe_error_policy: ProbeErrorPolicy::default(),
            deadline_secs: None,
            image_extension: default_image_extension(),
            show_progress: default_show_progress(),
        }
    }
}

impl RuntimeConfig {
    /// 🔒 One-time sanity check. Bad knobs fail the run here, not 40,000 jobs in.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("💀 max_concurrent_jobs must be at least 1. Zero lanes is a parking lot.");
        }
        if self.worker_count == Some(0) {
            anyhow::bail!("💀 worker_count must be at least 1 when set. Somebody has to do the work.");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("💀 queue_capacity must be at least 1.");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("💀 max_attempts must be at least 1. Zero attempts is just giving up early.");
        }
        if self.fetch_timeout_ms == 0 || self.upload_timeout_ms == 0 {
            anyhow::bail!("💀 fetch_timeout_ms and upload_timeout_ms must be greater than zero.");
        }
        if self.deadline_secs == Some(0) {
            anyhow::bail!("💀 deadline_secs = 0 would cancel the run before it starts.");
        }
        let extension = self.image_extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains('/') || extension.contains('\\') {
            anyhow::bail!(
                "💀 image_extension '{}' is not a usable file extension.",
                self.image_extension
            );
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.unwrap_or(self.max_concurrent_jobs)
    }

    pub fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.fetch_timeout_ms),
        )
    }

    pub fn upload_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.upload_timeout_ms),
        )
    }

    pub fn upload_pacing(&self) -> Duration {
        Duration::from_millis(self.upload_pacing_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`IMGSHIP_*`, nested keys split on `__`, e.g.
/// `IMGSHIP_RUNTIME__MAX_CONCURRENT_JOBS=4`) with an optional TOML file.
///
/// 📐 DESIGN NOTE:
///   - If `config_file_name` is None  → env vars only.
///   - If `config_file_name` is Some  → env vars + TOML file, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("IMGSHIP_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (IMGSHIP_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (IMGSHIP_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_test_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let temp_path = dir.path().join("imgship.toml");
        // 🧪 We write a real file here because Figment wants TOML from disk, like it's method acting.
        fs::write(&temp_path, contents)
            .expect("💀 Failed to write test config. The filesystem said 'new phone who dis'.");
        temp_path
    }

    #[test]
    fn the_one_where_runtime_knobs_arrive_from_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = write_test_config(
            &dir,
            r#"
            [runtime]
            max_concurrent_jobs = 4
            worker_count = 8
            upload_pacing_ms = 0
            probe_error_policy = "fail"
            deadline_secs = 600

            [source_config.File]
            file_name = "export.ndjson"

            [store_config.Gcs]
            bucket = "product-images"
            service_account_path = "/secrets/gcs.json"
            "#,
        );

        let app_config = load_config(Some(config_path.as_path())).expect(
            "💀 Runtime config should parse. The schema drift goblin does not get this win.",
        );

        assert_eq!(app_config.runtime.max_concurrent_jobs, 4);
        assert_eq!(app_config.runtime.worker_count(), 8);
        assert_eq!(app_config.runtime.upload_pacing(), Duration::ZERO);
        assert_eq!(app_config.runtime.probe_error_policy, ProbeErrorPolicy::Fail);
        assert_eq!(app_config.runtime.deadline(), Some(Duration::from_secs(600)));
        match app_config.store_config {
            StoreConfig::Gcs(gcs) => {
                assert_eq!(gcs.bucket, "product-images");
                assert_eq!(gcs.endpoint, "https://storage.googleapis.com");
                assert!(gcs.access_token.is_none());
                assert_eq!(gcs.service_account_path.as_deref(), Some("/secrets/gcs.json"));
                assert!(gcs.service_account_key.is_none());
            }
            honestly_who_knows => panic!(
                "💀 Expected Gcs store config in the test, but serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
    }

    #[test]
    fn the_one_where_runtime_defaults_show_up_uninvited_but_helpful() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = write_test_config(
            &dir,
            r#"
            [source_config.File]
            file_name = "export.ndjson"

            [sink_config.File]
            directory = "out"
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(config_path.as_path()))
            .extract()
            .expect("💀 Default runtime config should exist. Serde left us on read otherwise.");

        assert_eq!(app_config.runtime, RuntimeConfig::default());
        assert_eq!(app_config.runtime.max_concurrent_jobs, 10);
        assert_eq!(app_config.runtime.worker_count(), 10);
        assert_eq!(app_config.runtime.fetch_policy().attempt_timeout, Duration::from_secs(30));
        assert_eq!(app_config.runtime.upload_policy().attempt_timeout, Duration::from_secs(60));
        assert_eq!(app_config.runtime.fetch_policy().max_attempts, 3);
        assert_eq!(app_config.runtime.upload_pacing(), Duration::from_millis(100));
        assert_eq!(app_config.runtime.probe_error_policy, ProbeErrorPolicy::AttemptTransfer);
        match app_config.store_config {
            StoreConfig::File(file) => assert!(file.create_directory),
            other => panic!("💀 sink_config alias should land on File, got {:?}", other),
        }
    }

    #[test]
    fn the_one_where_in_memory_configs_carry_their_own_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = write_test_config(
            &dir,
            r#"
            [[source_config.InMemory.records]]
            productId = 42
            media = [{ medium = "https://cdn.example.com/42.jpg", type = "front" }]

            [store_config.InMemory]
            existing_keys = ["42_front.jpg"]
            "#,
        );

        let app_config = load_config(Some(config_path.as_path())).expect("💀 in-memory config should parse");
        match app_config.source_config {
            SourceConfig::InMemory { records } => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].product_id().as_deref(), Some("42"));
            }
            other => panic!("💀 expected InMemory source, got {:?}", other),
        }
        match app_config.store_config {
            StoreConfig::InMemory { existing_keys } => assert_eq!(existing_keys, vec!["42_front.jpg"]),
            other => panic!("💀 expected InMemory store, got {:?}", other),
        }
    }

    #[test]
    fn the_one_where_validation_turns_away_the_nonsense() {
        assert!(RuntimeConfig::default().validate().is_ok());

        let zero_lanes = RuntimeConfig {
            max_concurrent_jobs: 0,
            ..RuntimeConfig::default()
        };
        assert!(zero_lanes.validate().is_err());

        let zero_attempts = RuntimeConfig {
            max_attempts: 0,
            ..RuntimeConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let zero_timeout = RuntimeConfig {
            upload_timeout_ms: 0,
            ..RuntimeConfig::default()
        };
        assert!(zero_timeout.validate().is_err());

        let sneaky_extension = RuntimeConfig {
            image_extension: "../jpg".to_string(),
            ..RuntimeConfig::default()
        };
        assert!(sneaky_extension.validate().is_err());

        let dotted_extension = RuntimeConfig {
            image_extension: ".png".to_string(),
            ..RuntimeConfig::default()
        };
        assert!(dotted_extension.validate().is_ok());
    }
}
