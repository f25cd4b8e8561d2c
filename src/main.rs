//! Binary entry point for the book catalog TUI.
//!
//! Startup runs in a fixed order: resolve `~/.book-catalog`, route `tracing`
//! output into a log file there (the terminal belongs to the UI), load or
//! create the connection settings, then hand control to the event loop. A
//! failed connection does not end the program; the app opens its settings
//! dialog instead and keeps running.
use book_catalog::{config, logging, run_app, App};

/// Bootstrap logging and settings, then run the TUI until the user quits.
///
/// Errors returned here are the ones that happen before the terminal is taken
/// over (no home directory, unwritable data directory, unreadable settings)
/// or that break the terminal itself.
fn main() -> anyhow::Result<()> {
    let data_dir = config::data_dir()?;
    logging::init(&data_dir)?;

    let config_path = config::config_path(&data_dir);
    let settings = config::load_or_create(&config_path)?;
    tracing::info!(config = %config_path.display(), "starting book catalog");

    let mut app = App::new(settings, data_dir, config_path);
    let result = run_app(&mut app);
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "exiting with error");
    }
    result
}
