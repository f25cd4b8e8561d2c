use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use super::books::{
    count_books, delete_book, distinct_values, fetch_books, filter_books, insert_book,
    search_books, update_book,
};
use super::schema::ensure_books_schema;
use crate::config::ConnectionSettings;
use crate::models::{number_rows, CatalogRow, FilterColumn, FilterCriteria, NewBook, SearchField};

/// Open (creating if needed) the SQLite file at `path`, register the SQL
/// helpers the queries rely on, and bring the schema up to date.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }

    let conn = Connection::open(path).context("failed to open SQLite database")?;
    prepare_connection(conn)
}

/// Same as [`open_connection`] for a throwaway in-memory database.
pub fn open_connection_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    prepare_connection(conn)
}

fn prepare_connection(mut conn: Connection) -> Result<Connection> {
    register_functions(&conn)?;
    ensure_books_schema(&mut conn).context("failed to initialize books schema")?;
    Ok(conn)
}

/// `casefold(x)`: Unicode lower-case of a text value, integers rendered as
/// decimal text, NULL otherwise. SQLite's built-in `lower()` only folds ASCII.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let folded = match ctx.get_raw(0) {
                ValueRef::Text(text) => Some(String::from_utf8_lossy(text).to_lowercase()),
                ValueRef::Integer(value) => Some(value.to_string()),
                ValueRef::Real(value) => Some(value.to_string()),
                ValueRef::Null | ValueRef::Blob(_) => None,
            };
            Ok(folded)
        },
    )
    .context("failed to register casefold function")
}

/// The single open handle to the book catalog. Every read and write the UI
/// performs goes through this value; dropping or [`Catalog::close`]-ing it
/// releases the database.
#[derive(Debug)]
pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Connect using the persisted settings. The database file lives under
    /// `data_dir` unless the settings name an absolute path.
    pub fn open(settings: &ConnectionSettings, data_dir: &Path) -> Result<Self> {
        let path = settings.database_path(data_dir)?;
        let conn = open_connection(&path)
            .with_context(|| format!("failed to connect to {}", settings.describe()))?;
        tracing::info!(
            settings = %settings.describe(),
            path = %path.display(),
            "opened catalog database"
        );
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: open_connection_in_memory()?,
            path: None,
        })
    }

    /// Release the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, err)| err)
            .context("failed to close catalog database")?;
        if let Some(path) = path {
            tracing::info!(path = %path.display(), "closed catalog database");
        }
        Ok(())
    }

    /// Path of the backing file, `None` for in-memory catalogs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Every book in shelf order. Store faults are logged and produce an empty
    /// listing rather than an error.
    pub fn list_all(&self) -> Vec<CatalogRow> {
        match fetch_books(&self.conn) {
            Ok(books) => number_rows(books),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to list books");
                Vec::new()
            }
        }
    }

    pub fn count(&self) -> Result<i64> {
        count_books(&self.conn)
    }

    pub fn insert(&self, book: &NewBook) -> Result<i64> {
        let id = insert_book(&self.conn, book)?;
        tracing::info!(id, title = book.title(), "inserted book");
        Ok(id)
    }

    pub fn update(&self, id: i64, book: &NewBook) -> Result<()> {
        update_book(&self.conn, id, book)?;
        tracing::info!(id, title = book.title(), "updated book");
        Ok(())
    }

    /// Delete a book; every book with a greater id shifts down by one.
    pub fn delete(&mut self, id: i64) -> Result<()> {
        delete_book(&mut self.conn, id)?;
        tracing::info!(id, "deleted book");
        Ok(())
    }

    pub fn search(&self, field: SearchField, needle: &str) -> Result<Vec<CatalogRow>> {
        Ok(number_rows(search_books(&self.conn, field, needle)?))
    }

    pub fn filter(&self, criteria: &FilterCriteria) -> Result<Vec<CatalogRow>> {
        Ok(number_rows(filter_books(&self.conn, criteria)?))
    }

    pub fn distinct_values(&self, column: FilterColumn) -> Result<Vec<String>> {
        distinct_values(&self.conn, column)
    }
}
