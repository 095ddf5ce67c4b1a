//! Tracing setup: human-readable console output plus a JSON log file per day.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Keeps the log file open; flushes it when dropped.
pub struct LogGuard {
    file: Arc<File>,
    path: PathBuf,
}

impl LogGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        let _ = self.file.sync_all();
    }
}

/// `RUST_LOG` wins over the verbosity flag.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let log_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Path of today's log file inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("{}.log", Local::now().format("%Y-%m-%d")))
}

/// Installs the global subscriber. Call once, before the pipeline starts, and
/// keep the guard alive for the rest of the run.
pub fn init(verbose: bool, log_dir: &Path) -> Result<LogGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let path = log_file_path(log_dir);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let file = Arc::new(file);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt::layer())
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Arc::clone(&file)),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(LogGuard { file, path })
}
