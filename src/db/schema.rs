//! Creation and migration of the `books` table.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Transaction};

use crate::models::split_location;

/// Value stored in `PRAGMA user_version` once the `books` table has the
/// separate `rack`/`shelf` columns.
pub const SCHEMA_VERSION: i32 = 2;

const CREATE_BOOKS_TABLE: &str = "CREATE TABLE books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    year INTEGER NOT NULL,
    genre TEXT,
    publisher TEXT,
    isbn TEXT,
    quantity INTEGER NOT NULL DEFAULT 1,
    rack TEXT NOT NULL DEFAULT '',
    shelf TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

/// What schema initialization found when it inspected the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// No `books` table yet.
    Missing,
    /// Legacy layout with a combined `location` column.
    Unmigrated,
    /// Already on the current layout.
    Current,
}

/// Inspect the database and classify the `books` table.
pub fn detect_schema_state(conn: &Connection) -> Result<SchemaState> {
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'books'",
            [],
            |row| row.get(0),
        )
        .context("failed to look up books table")?;
    if exists == 0 {
        return Ok(SchemaState::Missing);
    }

    let columns = book_columns(conn)?;
    let has = |name: &str| columns.iter().any(|c| c == name);
    if has("location") || !has("rack") || !has("shelf") {
        Ok(SchemaState::Unmigrated)
    } else {
        Ok(SchemaState::Current)
    }
}

/// Bring the `books` table to the current layout and return the state that
/// was found. Each transition commits as one transaction, so a failure leaves
/// the previous layout in place.
pub fn ensure_books_schema(conn: &mut Connection) -> Result<SchemaState> {
    let state = detect_schema_state(conn)?;

    match state {
        SchemaState::Missing => {
            let tx = conn
                .transaction()
                .context("failed to start schema transaction")?;
            tx.execute(CREATE_BOOKS_TABLE, [])
                .context("failed to create books table")?;
            set_schema_version(&tx)?;
            tx.commit().context("failed to commit books table")?;
            tracing::info!("created books table");
        }
        SchemaState::Unmigrated => {
            let tx = conn
                .transaction()
                .context("failed to start migration transaction")?;
            let migrated = migrate_location_column(&tx)?;
            set_schema_version(&tx)?;
            tx.commit().context("failed to commit location migration")?;
            tracing::info!(rows = migrated, "split legacy location into rack and shelf");
        }
        SchemaState::Current => {
            let version: i32 = conn
                .query_row("PRAGMA user_version", [], |row| row.get(0))
                .context("failed to read schema version")?;
            if version != SCHEMA_VERSION {
                conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
                    .context("failed to record schema version")?;
            }
        }
    }

    Ok(state)
}

fn book_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(books)")
        .context("failed to prepare table_info query")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .context("failed to read books columns")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect books columns")?;
    Ok(columns)
}

fn set_schema_version(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .context("failed to record schema version")
}

/// Add `rack`/`shelf`, fill them from `location`, then drop `location`.
/// Returns how many rows carried a location value.
fn migrate_location_column(tx: &Transaction<'_>) -> Result<usize> {
    let columns = book_columns(tx)?;
    let has = |name: &str| columns.iter().any(|c| c == name);

    if !has("rack") {
        tx.execute("ALTER TABLE books ADD COLUMN rack TEXT NOT NULL DEFAULT ''", [])
            .context("failed to add rack column")?;
    }
    if !has("shelf") {
        tx.execute("ALTER TABLE books ADD COLUMN shelf TEXT NOT NULL DEFAULT ''", [])
            .context("failed to add shelf column")?;
    }
    if !has("location") {
        return Ok(0);
    }

    let locations = {
        let mut stmt = tx
            .prepare("SELECT id, location FROM books WHERE location IS NOT NULL AND location <> ''")
            .context("failed to prepare location query")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .context("failed to read locations")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to collect locations")?;
        rows
    };

    for (id, location) in &locations {
        let (rack, shelf) = split_location(location);
        tx.execute(
            "UPDATE books SET rack = ?1, shelf = ?2 WHERE id = ?3",
            params![rack, shelf, id],
        )
        .with_context(|| format!("failed to migrate location of book {id}"))?;
    }

    tx.execute("ALTER TABLE books DROP COLUMN location", [])
        .context("failed to drop location column")?;

    Ok(locations.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{delete_book, open_connection};
    use tempfile::TempDir;

    const LEGACY_TABLE: &str = "CREATE TABLE books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        year INTEGER NOT NULL,
        genre TEXT,
        publisher TEXT,
        isbn TEXT,
        quantity INTEGER DEFAULT 1,
        location TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )";

    fn user_version(conn: &Connection) -> i32 {
        conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn creates_missing_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(detect_schema_state(&conn).unwrap(), SchemaState::Missing);

        assert_eq!(ensure_books_schema(&mut conn).unwrap(), SchemaState::Missing);
        assert_eq!(detect_schema_state(&conn).unwrap(), SchemaState::Current);
        assert_eq!(user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn initialization_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_books_schema(&mut conn).unwrap();
        let before = book_columns(&conn).unwrap();

        assert_eq!(ensure_books_schema(&mut conn).unwrap(), SchemaState::Current);
        assert_eq!(book_columns(&conn).unwrap(), before);
        assert_eq!(user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn legacy_location_is_split_and_dropped() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(LEGACY_TABLE, []).unwrap();
        conn.execute(
            "INSERT INTO books (title, author, year, location) VALUES
                ('Dune', 'Herbert', 1965, 'a-12'),
                ('Emma', 'Austen', 1815, 'C7'),
                ('Ulysses', 'Joyce', 1922, NULL)",
            [],
        )
        .unwrap();
        assert_eq!(detect_schema_state(&conn).unwrap(), SchemaState::Unmigrated);

        assert_eq!(
            ensure_books_schema(&mut conn).unwrap(),
            SchemaState::Unmigrated
        );

        let columns = book_columns(&conn).unwrap();
        assert!(!columns.iter().any(|c| c == "location"));
        assert!(columns.iter().any(|c| c == "rack"));
        assert!(columns.iter().any(|c| c == "shelf"));

        let placement = |title: &str| -> (String, String) {
            conn.query_row(
                "SELECT rack, shelf FROM books WHERE title = ?1",
                [title],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
        };
        assert_eq!(placement("Dune"), ("A".to_string(), "12".to_string()));
        assert_eq!(placement("Emma"), ("C".to_string(), "7".to_string()));
        assert_eq!(placement("Ulysses"), (String::new(), String::new()));

        assert_eq!(ensure_books_schema(&mut conn).unwrap(), SchemaState::Current);
    }

    #[test]
    fn legacy_table_without_autoincrement_still_deletes() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE books (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                year INTEGER NOT NULL,
                location TEXT
            )",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO books (title, author, year, location) VALUES
                ('A', 'X', 2000, 'A-1'),
                ('B', 'X', 2000, 'B-2'),
                ('C', 'X', 2000, 'C-3')",
            [],
        )
        .unwrap();

        ensure_books_schema(&mut conn).unwrap();
        delete_book(&mut conn, 2).unwrap();

        let ids: Vec<(i64, String)> = conn
            .prepare("SELECT id, title FROM books ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec![(1, "A".to_string()), (2, "C".to_string())]);

        conn.execute(
            "INSERT INTO books (title, author, year) VALUES ('D', 'X', 2000)",
            [],
        )
        .unwrap();
        assert_eq!(conn.last_insert_rowid(), 3);
    }

    const LEGACY_WITH_INDEX: &str = "CREATE INDEX books_location ON books(location)";

    #[test]
    fn failed_migration_leaves_legacy_layout() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(LEGACY_TABLE, []).unwrap();
        conn.execute(LEGACY_WITH_INDEX, []).unwrap();
        conn.execute(
            "INSERT INTO books (title, author, year, location) VALUES ('Dune', 'Herbert', 1965, 'A-1')",
            [],
        )
        .unwrap();
        let before = book_columns(&conn).unwrap();

        assert!(ensure_books_schema(&mut conn).is_err());
        assert_eq!(book_columns(&conn).unwrap(), before);
        assert_eq!(detect_schema_state(&conn).unwrap(), SchemaState::Unmigrated);
        assert_eq!(user_version(&conn), 0);
    }

    #[test]
    fn failed_migration_refuses_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(LEGACY_TABLE, []).unwrap();
            conn.execute(LEGACY_WITH_INDEX, []).unwrap();
        }

        assert!(open_connection(&path).is_err());

        let conn = Connection::open(&path).unwrap();
        assert!(book_columns(&conn).unwrap().iter().any(|c| c == "location"));
    }
}
