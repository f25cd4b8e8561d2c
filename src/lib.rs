//! Core library surface for the terminal book catalog.
//!
//! The catalog lives in an embedded SQLite file owned by a single
//! [`Catalog`] handle. Around it sit the pieces the binary stitches together:
//! `config` loads and saves the connection settings, `validation` turns raw
//! form or import input into a [`NewBook`] the store will accept, `transfer`
//! moves the catalog in and out of JSON, and `ui` drives the Ratatui front-end.
//! Everything except `ui` works without a terminal, which is how the tests
//! exercise it.
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod transfer;
pub mod ui;
pub mod validation;

pub use config::ConnectionSettings;
pub use db::Catalog;
pub use models::{Book, CatalogRow, FilterColumn, FilterCriteria, NewBook, SearchField};
pub use transfer::{export_books, import_books, ImportBatch, ImportReport};
/// The interactive application entry point and state container.
pub use ui::{run_app, App};
pub use validation::{BookDraft, ValidationError};
