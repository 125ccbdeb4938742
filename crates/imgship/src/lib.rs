//! 🖼️ imgship — copies product images from wherever they live into an object store,
//! a bounded number at a time, skipping what's already there.
//!
//! 🧠 Knowledge graph:
//! - `app_config`: what to read, where to write, how hard to push.
//! - `supervisors`: wires the workers and waits at the drain barrier.
//! - `transfer`: existence probe, admission gate, fetch, upload, retry.
//! - `stats`: the counters and the final [`RunSummary`].

pub mod app_config;
pub(crate) mod backends;
pub mod common;
pub(crate) mod progress;
pub mod stats;
pub(crate) mod supervisors;
pub(crate) mod transfer;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::app_config::AppConfig;
use crate::supervisors::Supervisor;

pub use crate::stats::RunSummary;

/// 🚀 Runs the pipeline to completion with nobody holding the big red button
/// (a configured deadline still can).
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    run_with_cancellation(app_config, CancellationToken::new()).await
}

/// 🛑 Runs the pipeline; cancelling `cancel` stops admissions, lets in-flight attempts finish,
/// and still returns a (partial) summary.
pub async fn run_with_cancellation(app_config: AppConfig, cancel: CancellationToken) -> Result<RunSummary> {
    let supervisor = Supervisor::from_config(app_config)
        .await
        .context("💀 Couldn't set up the pipeline. The source or the store said no before a single image moved.")?;
    supervisor.run(cancel).await
}
