//! 🧵 Workers: the unsung heroes, the ones who actually do the work while the Supervisor
//! takes all the credit in the sprint retro.
//!
//! 🧠 Knowledge graph:
//! - `SourceWorker`: records → jobs → bounded queue. One per run.
//! - `TransferWorker`: queue → probe → slot → fetch → upload → outcome. A pool of them.
//! - `ProgressWorker`: reads the counters, paints the bar. One per run.
//!
//! ⚠️ "If you're reading this, the code review went poorly." 🦆

use anyhow::Result;
use tokio::task::JoinHandle;

mod progress_worker;
mod source_worker;
mod transfer_worker;

pub(crate) use progress_worker::ProgressWorker;
pub(crate) use source_worker::SourceWorker;
pub(crate) use transfer_worker::{TransferContext, TransferWorker};

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" — Seinfeld, on Rust
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}
