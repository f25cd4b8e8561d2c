//! File-backed `tracing` setup.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Log file kept next to the database.
const LOG_FILE_NAME: &str = "book-catalog.log";

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir).context("failed to create data directory")?;
    let path = data_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install logger: {err}"))
}
