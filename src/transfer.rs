//! JSON import and export of the catalog.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::Catalog;
use crate::models::{split_location, Book};
use crate::validation::BookDraft;

/// Exported shape of a book: every stored field except the timestamps.
#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    id: i64,
    title: &'a str,
    author: &'a str,
    year: i32,
    genre: &'a str,
    publisher: &'a str,
    isbn: &'a str,
    quantity: i64,
    rack: &'a str,
    shelf: &'a str,
}

impl<'a> From<&'a Book> for ExportRecord<'a> {
    fn from(book: &'a Book) -> Self {
        Self {
            id: book.id,
            title: &book.title,
            author: &book.author,
            year: book.year,
            genre: &book.genre,
            publisher: &book.publisher,
            isbn: &book.isbn,
            quantity: book.quantity,
            rack: &book.rack,
            shelf: &book.shelf,
        }
    }
}

/// Write `books` to `path` as an indented JSON array. Returns how many
/// records were written.
pub fn export_books(books: &[Book], path: &Path) -> Result<usize> {
    if books.is_empty() {
        return Err(anyhow!("No books to export."));
    }

    let records: Vec<ExportRecord<'_>> = books.iter().map(ExportRecord::from).collect();
    let file = File::create(path)
        .with_context(|| format!("failed to create export file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &records).context("failed to write export")?;
    writer.write_all(b"\n").context("failed to write export")?;
    writer.flush().context("failed to flush export")?;

    tracing::info!(count = records.len(), path = %path.display(), "exported books");
    Ok(records.len())
}

/// Import files may carry numbers as strings and vice versa (older exports
/// stringified every value), so scalar fields accept either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Integer(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
        }
    }
}

/// One object of an import file. Unknown keys such as `id` or the timestamps
/// are ignored; a missing or null `title`, `author` or `year` fails
/// deserialization and the object is skipped.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    title: Scalar,
    author: Scalar,
    year: Scalar,
    #[serde(default)]
    genre: Option<Scalar>,
    #[serde(default)]
    publisher: Option<Scalar>,
    #[serde(default)]
    isbn: Option<Scalar>,
    #[serde(default)]
    quantity: Option<Scalar>,
    #[serde(default)]
    rack: Option<Scalar>,
    #[serde(default)]
    shelf: Option<Scalar>,
    #[serde(default)]
    location: Option<Scalar>,
}

impl ImportRecord {
    fn into_draft(self) -> BookDraft {
        let text = |value: Option<Scalar>| value.map(Scalar::into_text).unwrap_or_default();

        let (rack, shelf) = match (self.rack, self.shelf, self.location) {
            (None, None, Some(location)) => split_location(&location.into_text()),
            (rack, shelf, _) => (text(rack), text(shelf)),
        };

        BookDraft {
            title: self.title.into_text(),
            author: self.author.into_text(),
            year: self.year.into_text(),
            genre: text(self.genre),
            publisher: text(self.publisher),
            isbn: text(self.isbn),
            quantity: text(self.quantity),
            rack,
            shelf,
        }
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// The parsed contents of an import file, held until the user confirms.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    entries: Vec<Value>,
}

impl ImportBatch {
    /// Read and parse `path`. The file must hold a JSON array.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read import file {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).context("import file is not valid JSON")?;
        match value {
            Value::Array(entries) => Ok(Self { entries }),
            _ => Err(anyhow!("Import file must contain a JSON array of books.")),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert every acceptable entry. Entries missing a required key, failing
    /// validation, or rejected by the store are skipped and counted. The
    /// caller reloads its view afterwards so store-assigned ids are used.
    pub fn apply(self, catalog: &Catalog) -> ImportReport {
        let mut report = ImportReport::default();

        for (position, entry) in self.entries.into_iter().enumerate() {
            let record = match serde_json::from_value::<ImportRecord>(entry) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(position, error = %err, "skipping import entry");
                    report.skipped += 1;
                    continue;
                }
            };

            let book = match record.into_draft().validate() {
                Ok(book) => book,
                Err(err) => {
                    tracing::warn!(position, error = %err, "skipping invalid import entry");
                    report.skipped += 1;
                    continue;
                }
            };

            match catalog.insert(&book) {
                Ok(_) => report.inserted += 1,
                Err(err) => {
                    tracing::error!(position, error = %format!("{err:#}"), "failed to import entry");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "import finished"
        );
        report
    }
}

/// Convenience wrapper: load `path` and apply it in one step.
pub fn import_books(catalog: &Catalog, path: &Path) -> Result<ImportReport> {
    Ok(ImportBatch::load(path)?.apply(catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn books_of(catalog: &Catalog) -> Vec<Book> {
        catalog.list_all().into_iter().map(|row| row.book).collect()
    }

    #[test]
    fn entry_without_year_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.json", r#"[{"title":"A","author":"B"}]"#);
        let catalog = Catalog::open_in_memory().unwrap();

        let report = import_books(&catalog, &path).unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(catalog.count().unwrap(), 0);
    }

    #[test]
    fn lenient_scalars_and_defaults() {
        let raw = r#"[
            {"id": "7", "title": "Dune", "author": "Herbert", "year": "1965",
             "quantity": "2", "rack": "sf", "shelf": 3, "created_at": "2020-01-01"},
            {"title": "Emma", "author": "Austen", "year": 1815, "genre": null},
            {"title": null, "author": "Nobody", "year": 2000}
        ]"#;
        let catalog = Catalog::open_in_memory().unwrap();

        let batch = ImportBatch::parse(raw).unwrap();
        assert_eq!(batch.len(), 3);
        let report = batch.apply(&catalog);
        assert_eq!(report, ImportReport { inserted: 2, skipped: 1 });

        let books = books_of(&catalog);
        let emma = books.iter().find(|b| b.title == "Emma").unwrap();
        assert_eq!(emma.quantity, 1);
        assert_eq!(emma.genre, "");
        let dune = books.iter().find(|b| b.title == "Dune").unwrap();
        assert_eq!(dune.quantity, 2);
        assert_eq!((dune.rack.as_str(), dune.shelf.as_str()), ("SF", "3"));
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let raw = r#"[
            {"title": "Bad rack", "author": "X", "year": 2000, "rack": "a1"},
            {"title": "Future", "author": "X", "year": 99999},
            {"title": "Good", "author": "X", "year": 2000}
        ]"#;
        let catalog = Catalog::open_in_memory().unwrap();

        let report = ImportBatch::parse(raw).unwrap().apply(&catalog);
        assert_eq!(report, ImportReport { inserted: 1, skipped: 2 });
    }

    #[test]
    fn legacy_location_key_is_split() {
        let raw = r#"[{"title": "Old", "author": "X", "year": 1990, "location": "b-4"}]"#;
        let catalog = Catalog::open_in_memory().unwrap();

        ImportBatch::parse(raw).unwrap().apply(&catalog);
        let book = &books_of(&catalog)[0];
        assert_eq!((book.rack.as_str(), book.shelf.as_str()), ("B", "4"));
    }

    #[test]
    fn non_array_file_is_rejected() {
        assert!(ImportBatch::parse(r#"{"title": "A"}"#).is_err());
        assert!(ImportBatch::parse("not json").is_err());
    }

    #[test]
    fn export_refuses_empty_set() {
        let dir = TempDir::new().unwrap();
        assert!(export_books(&[], &dir.path().join("out.json")).is_err());
    }

    #[test]
    fn export_omits_timestamps_and_keeps_unicode() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        ImportBatch::parse(r#"[{"title": "Мастер и Маргарита", "author": "Булгаков", "year": 1967}]"#)
            .unwrap()
            .apply(&catalog);

        let path = dir.path().join("out.json");
        assert_eq!(export_books(&books_of(&catalog), &path).unwrap(), 1);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Мастер и Маргарита"));
        assert!(raw.contains("\n  {"));
        let value: Value = serde_json::from_str(&raw).unwrap();
        let object = value[0].as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "author", "genre", "id", "isbn", "publisher", "quantity", "rack", "shelf",
                "title", "year"
            ]
        );
    }

    #[test]
    fn export_import_round_trip_preserves_fields() {
        let dir = TempDir::new().unwrap();
        let source = Catalog::open_in_memory().unwrap();
        let raw = r#"[
            {"title": "Dune", "author": "Herbert", "year": 1965, "genre": "SF",
             "publisher": "Chilton", "isbn": "0-441-17271-7", "quantity": 3,
             "rack": "A", "shelf": "12"},
            {"title": "Emma", "author": "Austen", "year": 1815, "genre": "",
             "publisher": "", "isbn": "", "quantity": 1, "rack": "", "shelf": ""}
        ]"#;
        ImportBatch::parse(raw).unwrap().apply(&source);

        let first = dir.path().join("first.json");
        export_books(&books_of(&source), &first).unwrap();

        let target = Catalog::open_in_memory().unwrap();
        let report = import_books(&target, &first).unwrap();
        assert_eq!(report.inserted, 2);

        let second = dir.path().join("second.json");
        export_books(&books_of(&target), &second).unwrap();

        let strip_ids = |path: &Path| -> Vec<Value> {
            let value: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
            value
                .as_array()
                .unwrap()
                .iter()
                .cloned()
                .map(|mut entry| {
                    entry.as_object_mut().unwrap().remove("id");
                    entry
                })
                .collect()
        };
        assert_eq!(strip_ids(&first), strip_ids(&second));
    }
}
