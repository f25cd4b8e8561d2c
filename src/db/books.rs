//! Queries against the `books` table.
//!
//! Every function takes a borrowed connection so they compose inside the
//! `Catalog` handle and in tests against in-memory databases. Optional text
//! columns are written as NULL when empty and read back as empty strings.

use anyhow::{anyhow, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::models::{Book, FilterColumn, FilterCriteria, NewBook, SearchField};

/// Column list shared by every query that hydrates a [`Book`].
const BOOK_COLUMNS: &str = "id, title, author, year, genre, publisher, isbn, quantity, rack, \
                            shelf, created_at, updated_at";

/// Shelf placement order used by listings and filters. Shelves are digit
/// strings, so they sort numerically first.
const PLACEMENT_ORDER: &str =
    "ORDER BY rack, CAST(shelf AS INTEGER), shelf, title COLLATE NOCASE, id";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        year: row.get(3)?,
        genre: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        publisher: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        isbn: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        quantity: row.get::<_, Option<i64>>(7)?.unwrap_or(1),
        rack: row.get(8)?,
        shelf: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Empty optional fields are stored as NULL.
fn nullable(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Every book ordered by rack, shelf and title.
pub fn fetch_books(conn: &Connection) -> Result<Vec<Book>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {BOOK_COLUMNS} FROM books {PLACEMENT_ORDER}"))
        .context("failed to prepare books query")?;

    let books = stmt
        .query_map([], book_from_row)
        .context("failed to load books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect books")?;

    Ok(books)
}

/// Look up a single book by storage id.
pub fn fetch_book(conn: &Connection, id: i64) -> Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
        params![id],
        book_from_row,
    )
    .optional()
    .context("failed to load book")
}

pub fn count_books(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
        .context("failed to count books")
}

/// Insert a validated book and return the storage id assigned to it.
pub fn insert_book(conn: &Connection, book: &NewBook) -> Result<i64> {
    conn.execute(
        "INSERT INTO books (title, author, year, genre, publisher, isbn, quantity, rack, shelf)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            book.title(),
            book.author(),
            book.year(),
            nullable(book.genre()),
            nullable(book.publisher()),
            nullable(book.isbn()),
            book.quantity(),
            book.rack(),
            book.shelf(),
        ],
    )
    .context("failed to insert book")?;

    Ok(conn.last_insert_rowid())
}

/// Overwrite every editable field of an existing book and bump `updated_at`.
pub fn update_book(conn: &Connection, id: i64, book: &NewBook) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE books
             SET title = ?1, author = ?2, year = ?3, genre = ?4, publisher = ?5, isbn = ?6,
                 quantity = ?7, rack = ?8, shelf = ?9, updated_at = datetime('now')
             WHERE id = ?10",
            params![
                book.title(),
                book.author(),
                book.year(),
                nullable(book.genre()),
                nullable(book.publisher()),
                nullable(book.isbn()),
                book.quantity(),
                book.rack(),
                book.shelf(),
                id,
            ],
        )
        .context("failed to update book")?;

    if updated == 0 {
        Err(anyhow!("Book not found"))
    } else {
        Ok(())
    }
}

/// Delete a book and renumber the survivors to `1..=N` in their previous id
/// order, then reset the AUTOINCREMENT counter so the next insert gets `N+1`.
/// The whole sequence is one transaction; any failure rolls it back.
pub fn delete_book(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to start delete transaction")?;

    let deleted = tx
        .execute("DELETE FROM books WHERE id = ?1", params![id])
        .context("failed to delete book")?;
    if deleted == 0 {
        return Err(anyhow!("Book not found"));
    }

    let ids = {
        let mut stmt = tx
            .prepare("SELECT id FROM books ORDER BY id")
            .context("failed to prepare renumber query")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .context("failed to read book ids")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to collect book ids")?;
        ids
    };

    let moves: Vec<(i64, i64)> = ids
        .iter()
        .enumerate()
        .map(|(idx, old)| (*old, idx as i64 + 1))
        .filter(|(old, new)| old != new)
        .collect();

    // Park moved rows on negative ids first so no intermediate state collides.
    for (old, _) in &moves {
        tx.execute("UPDATE books SET id = ?1 WHERE id = ?2", params![-old, old])
            .context("failed to renumber books")?;
    }
    for (old, new) in &moves {
        tx.execute("UPDATE books SET id = ?1 WHERE id = ?2", params![new, -old])
            .context("failed to renumber books")?;
    }

    // Tables without AUTOINCREMENT have no counter; SQLite hands out max(id)+1.
    let has_counter: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence')",
            [],
            |row| row.get(0),
        )
        .context("failed to look up book id counter")?;
    if has_counter {
        tx.execute(
            "UPDATE sqlite_sequence SET seq = ?1 WHERE name = 'books'",
            params![ids.len() as i64],
        )
        .context("failed to reset book id counter")?;
    }

    tx.commit().context("failed to commit delete")?;
    tracing::debug!(id, renumbered = moves.len(), "renumbered books after delete");
    Ok(())
}

/// Case-insensitive substring search on one allow-listed column, ordered by
/// storage id. Relies on the `casefold` SQL function registered when the
/// catalog connection is opened.
pub fn search_books(conn: &Connection, field: SearchField, needle: &str) -> Result<Vec<Book>> {
    let sql = format!(
        "SELECT {BOOK_COLUMNS} FROM books
         WHERE instr(casefold({column}), ?1) > 0
         ORDER BY id",
        column = field.column()
    );
    let mut stmt = conn.prepare(&sql).context("failed to prepare search query")?;

    let books = stmt
        .query_map(params![needle.to_lowercase()], book_from_row)
        .context("failed to search books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect search results")?;

    Ok(books)
}

/// Exact-match filter over genre, author, year and rack. Present constraints
/// are ANDed; with none this is the same listing as [`fetch_books`].
pub fn filter_books(conn: &Connection, criteria: &FilterCriteria) -> Result<Vec<Book>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    // Compared trimmed, matching the values `distinct_values` offers.
    if let Some(genre) = &criteria.genre {
        values.push(Value::Text(genre.trim().to_string()));
        conditions.push(format!("TRIM(genre) = ?{}", values.len()));
    }
    if let Some(author) = &criteria.author {
        values.push(Value::Text(author.trim().to_string()));
        conditions.push(format!("TRIM(author) = ?{}", values.len()));
    }
    if let Some(year) = criteria.year {
        values.push(Value::Integer(i64::from(year)));
        conditions.push(format!("year = ?{}", values.len()));
    }
    if let Some(rack) = &criteria.rack {
        values.push(Value::Text(rack.trim().to_uppercase()));
        conditions.push(format!("rack = ?{}", values.len()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!("SELECT {BOOK_COLUMNS} FROM books {where_clause} {PLACEMENT_ORDER}");
    let mut stmt = conn.prepare(&sql).context("failed to prepare filter query")?;

    let books = stmt
        .query_map(params_from_iter(values.iter()), book_from_row)
        .context("failed to filter books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect filtered books")?;

    Ok(books)
}

/// Distinct non-empty values of a filterable column for the filter choice
/// lists. Years come newest first; text columns sort case-insensitively.
pub fn distinct_values(conn: &Connection, column: FilterColumn) -> Result<Vec<String>> {
    let sql = match column {
        FilterColumn::Year => {
            "SELECT DISTINCT CAST(year AS TEXT), year FROM books ORDER BY year DESC".to_string()
        }
        other => format!(
            "SELECT DISTINCT TRIM({col}) AS value FROM books
             WHERE {col} IS NOT NULL AND TRIM({col}) <> ''
             ORDER BY LOWER(value), value",
            col = other.column()
        ),
    };
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("failed to prepare {} values query", column.column()))?;

    let mut rows = stmt
        .query([])
        .with_context(|| format!("failed to execute {} values query", column.column()))?;

    let mut values = Vec::new();
    while let Some(row) = rows.next().context("failed to fetch value row")? {
        let value: String = row.get(0).context("failed to read value")?;
        values.push(value);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_connection_in_memory;
    use crate::validation::BookDraft;

    fn book(title: &str, author: &str, year: i32, genre: &str, rack: &str, shelf: &str) -> NewBook {
        BookDraft {
            title: title.into(),
            author: author.into(),
            year: year.to_string(),
            genre: genre.into(),
            rack: rack.into(),
            shelf: shelf.into(),
            ..BookDraft::default()
        }
        .validate_until(2024)
        .unwrap()
    }

    fn ids(conn: &Connection) -> Vec<i64> {
        let mut ids: Vec<i64> = fetch_books(conn).unwrap().iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let conn = open_connection_in_memory().unwrap();
        assert_eq!(insert_book(&conn, &book("A", "X", 2000, "", "", "")).unwrap(), 1);
        assert_eq!(insert_book(&conn, &book("B", "Y", 2001, "", "", "")).unwrap(), 2);

        let stored = fetch_book(&conn, 2).unwrap().unwrap();
        assert_eq!(stored.title, "B");
        assert_eq!(stored.quantity, 1);
        assert_eq!(stored.genre, "");
    }

    #[test]
    fn delete_renumbers_and_resets_counter() {
        let mut conn = open_connection_in_memory().unwrap();
        for title in ["One", "Two", "Three"] {
            insert_book(&conn, &book(title, "X", 2000, "", "", "")).unwrap();
        }

        delete_book(&mut conn, 2).unwrap();

        assert_eq!(ids(&conn), vec![1, 2]);
        assert_eq!(fetch_book(&conn, 1).unwrap().unwrap().title, "One");
        assert_eq!(fetch_book(&conn, 2).unwrap().unwrap().title, "Three");

        let next = insert_book(&conn, &book("Four", "X", 2000, "", "", "")).unwrap();
        assert_eq!(next, 3);
    }

    #[test]
    fn ids_stay_contiguous_across_mixed_operations() {
        let mut conn = open_connection_in_memory().unwrap();
        for n in 0..6 {
            insert_book(&conn, &book(&format!("T{n}"), "X", 2000, "", "", "")).unwrap();
        }
        for victim in [1, 4, 4, 2] {
            delete_book(&mut conn, victim).unwrap();
            let count = count_books(&conn).unwrap();
            assert_eq!(ids(&conn), (1..=count).collect::<Vec<_>>());
        }
        insert_book(&conn, &book("Late", "X", 2000, "", "", "")).unwrap();
        assert_eq!(ids(&conn), vec![1, 2, 3]);
    }

    #[test]
    fn deleting_the_last_book_resets_counter_to_one() {
        let mut conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("Solo", "X", 2000, "", "", "")).unwrap();
        delete_book(&mut conn, 1).unwrap();
        assert_eq!(insert_book(&conn, &book("Again", "X", 2000, "", "", "")).unwrap(), 1);
    }

    #[test]
    fn delete_of_unknown_id_changes_nothing() {
        let mut conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("One", "X", 2000, "", "", "")).unwrap();
        assert!(delete_book(&mut conn, 9).is_err());
        assert_eq!(ids(&conn), vec![1]);
    }

    #[test]
    fn update_overwrites_fields() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("Draft", "X", 2000, "", "a", "1")).unwrap();

        update_book(&conn, 1, &book("Final", "Y", 2001, "Essay", "b", "2")).unwrap();

        let stored = fetch_book(&conn, 1).unwrap().unwrap();
        assert_eq!(stored.title, "Final");
        assert_eq!(stored.author, "Y");
        assert_eq!(stored.genre, "Essay");
        assert_eq!(stored.rack, "B");
        assert_eq!(stored.shelf, "2");
        assert!(update_book(&conn, 42, &book("Z", "Z", 2000, "", "", "")).is_err());
    }

    #[test]
    fn listing_orders_by_rack_shelf_title() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("Zed", "X", 2000, "", "B", "1")).unwrap();
        insert_book(&conn, &book("Beta", "X", 2000, "", "A", "10")).unwrap();
        insert_book(&conn, &book("Alpha", "X", 2000, "", "A", "9")).unwrap();
        insert_book(&conn, &book("Aardvark", "X", 2000, "", "A", "9")).unwrap();

        let titles: Vec<String> = fetch_books(&conn)
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["Aardvark", "Alpha", "Beta", "Zed"]);
    }

    #[test]
    fn search_is_case_insensitive_and_ordered_by_id() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("The Hobbit", "Tolkien", 1937, "", "B", "")).unwrap();
        insert_book(&conn, &book("Война и мир", "Толстой", 1869, "", "A", "")).unwrap();
        insert_book(&conn, &book("hobbies", "Someone", 2001, "", "A", "")).unwrap();

        let found = search_books(&conn, SearchField::Title, "HOBB").unwrap();
        assert_eq!(found.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 3]);

        let found = search_books(&conn, SearchField::Author, "толст").unwrap();
        assert_eq!(found.len(), 1);

        let found = search_books(&conn, SearchField::Year, "93").unwrap();
        assert_eq!(found[0].title, "The Hobbit");
    }

    #[test]
    fn search_skips_null_columns() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("Untagged", "X", 2000, "", "", "")).unwrap();
        insert_book(&conn, &book("Tagged", "X", 2000, "Poetry", "", "")).unwrap();

        let found = search_books(&conn, SearchField::Genre, "").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Tagged");
    }

    #[test]
    fn unknown_field_searches_titles() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("Needle", "Haystack", 2000, "", "", "")).unwrap();
        insert_book(&conn, &book("Haystack", "Needle", 2000, "", "", "")).unwrap();

        let fallback = search_books(&conn, SearchField::from("publisher"), "needle").unwrap();
        let by_title = search_books(&conn, SearchField::Title, "needle").unwrap();
        assert_eq!(fallback, by_title);
        assert_eq!(fallback[0].title, "Needle");
    }

    #[test]
    fn filter_constraints_are_anded() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("A", "Ann", 2001, "Fiction", "A", "1")).unwrap();
        insert_book(&conn, &book("B", "Ben", 2001, "History", "A", "2")).unwrap();
        insert_book(&conn, &book("C", "Ann", 1999, "Fiction", "B", "1")).unwrap();
        insert_book(&conn, &book("D", "Cid", 2001, " Fiction ", "C", "1")).unwrap();

        let criteria = FilterCriteria {
            genre: Some("Fiction".into()),
            year: Some(2001),
            ..FilterCriteria::default()
        };
        let titles: Vec<String> = filter_books(&conn, &criteria)
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["A", "D"]);

        let criteria = FilterCriteria {
            author: Some("Ann".into()),
            rack: Some("b".into()),
            ..FilterCriteria::default()
        };
        let found = filter_books(&conn, &criteria).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "C");
    }

    #[test]
    fn empty_filter_matches_listing() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("B", "X", 2000, "", "B", "")).unwrap();
        insert_book(&conn, &book("A", "X", 2000, "", "A", "")).unwrap();

        assert_eq!(
            filter_books(&conn, &FilterCriteria::default()).unwrap(),
            fetch_books(&conn).unwrap()
        );
    }

    #[test]
    fn distinct_values_are_trimmed_and_sorted() {
        let conn = open_connection_in_memory().unwrap();
        insert_book(&conn, &book("A", "zoe", 1999, "Poetry", "B", "")).unwrap();
        insert_book(&conn, &book("B", "Adam", 2005, "fiction", "", "")).unwrap();
        insert_book(&conn, &book("C", "Adam", 2001, "", "A", "")).unwrap();
        conn.execute("UPDATE books SET genre = '  Poetry ' WHERE id = 3", []).unwrap();

        assert_eq!(
            distinct_values(&conn, FilterColumn::Genre).unwrap(),
            vec!["fiction", "Poetry"]
        );
        assert_eq!(
            distinct_values(&conn, FilterColumn::Author).unwrap(),
            vec!["Adam", "zoe"]
        );
        assert_eq!(
            distinct_values(&conn, FilterColumn::Year).unwrap(),
            vec!["2005", "2001", "1999"]
        );
        assert_eq!(
            distinct_values(&conn, FilterColumn::Rack).unwrap(),
            vec!["A", "B"]
        );
    }
}
