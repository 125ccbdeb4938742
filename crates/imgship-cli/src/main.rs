//! 🚀 imgship-cli — the front door, the bouncer, the maitre d' of imgship.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up logging,
//! wires Ctrl-C to the big red button, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// 🖼️ Copy product images into an object store, a bounded number at a time.
#[derive(Debug, Parser)]
#[command(name = "imgship", version)]
struct Args {
    /// 🔧 TOML config file. Missing file = env vars (IMGSHIP_*) only.
    #[arg(default_value = "imgship.toml")]
    config: PathBuf,

    /// 🧾 Also write the run summary as JSON to this path.
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// 📓 Directory for the per-run log file (`upload_YYYYMMDD_HHMMSS.log`).
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// 🤫 Log to stdout only, no per-run log file.
    #[arg(long)]
    no_log_file: bool,
}

/// 🚀 main() — where it all begins. The "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Parse args
/// 2. Init tracing: stdout plus a log file per run (so we can see what goes wrong, and when, later)
/// 3. Load config (the moment of truth)
/// 4. Run the thing, with Ctrl-C / SIGTERM wired to cancellation
/// 5. Print the summary, or handle errors (cry)
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_file = if args.no_log_file {
        None
    } else {
        Some(open_log_file(&args.log_dir, Local::now())?)
    };
    init_tracing(log_file.as_ref().map(|(_, file)| file.clone()));
    if let Some((path, _)) = &log_file {
        info!("📓 logging this run to {}", path.display());
    }

    // 🔒 Validate the config file exists before we get too emotionally attached
    let config_file = args.config.as_path();
    let config_file_path_which_is_validated_to_exist = match config_file.try_exists()
        .context(format!("💀 Configuration file may not exist, couldn't find it. Double check that it exists, or maybe, it's an issue with pwd/cwd and relative paths. Was checking here: '{}'", config_file.display()))?
    {
        true => Some(config_file),
        false => None,
    };

    let app_config = imgship::app_config::load_config(config_file_path_which_is_validated_to_exist)
        .context("💀 In imgship-cli, main, we couldn't load the config file, take a look at the file, make sure it's correct.")?;

    let cancel = shutdown_on_signal();
    let result = imgship::run_with_cancellation(app_config, cancel).await;

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            report_error(&err);
            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    };

    println!("{}", summary);
    if summary.cancelled {
        warn!("🛑 run was cancelled; the summary above is partial");
    }

    if let Some(path) = args.summary_json {
        let json = serde_json::to_string_pretty(&summary)
            .context("💀 The summary refused to become JSON.")?;
        tokio::fs::write(&path, json)
            .await
            .context(format!("💀 Couldn't write the summary to '{}'", path.display()))?;
        info!("🧾 summary written to {}", path.display());
    }

    // ✅ If we got here, everything worked. Pop the champagne. 🍾
    Ok(())
}

/// 📓 `upload_%Y%m%d_%H%M%S.log`, one per run.
fn log_file_name(started: DateTime<Local>) -> String {
    started.format("upload_%Y%m%d_%H%M%S.log").to_string()
}

fn open_log_file(log_dir: &Path, started: DateTime<Local>) -> Result<(PathBuf, Arc<std::fs::File>)> {
    let path = log_dir.join(log_file_name(started));
    let file = std::fs::File::create(&path)
        .context(format!("💀 Couldn't create the run's log file at '{}'", path.display()))?;
    Ok((path, Arc::new(file)))
}

/// 🔔 `RUST_LOG` wins when set; otherwise `info`, so the run summary always shows up.
fn init_tracing(log_file: Option<Arc<std::fs::File>>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = log_file.map(|file| fmt::layer().with_ansi(false).with_writer(file));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
}

/// 🛑 Returns a token that fires on Ctrl-C (and SIGTERM on unix).
fn shutdown_on_signal() -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Ctrl-C received. Letting in-flight attempts finish, admitting nothing new...");
                on_ctrl_c.cancel();
            }
            Err(err) => error!("💀 couldn't listen for Ctrl-C: {}", err),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let on_term = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    warn!("🛑 SIGTERM received. Draining and shutting down...");
                    on_term.cancel();
                }
                Err(err) => error!("💀 couldn't listen for SIGTERM: {}", err),
            }
        });
    }

    cancel
}

/// 💀 Print the error chain, and a hint if it smells like a connectivity problem.
fn report_error(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like a service isn't reachable. \
            Double-check the storage endpoint and bucket, your network, and any emulator \
            you meant to have running. If you're using Docker, try `docker ps`. ☕"
        );
    }
}
