//! Domain models that mirror the SQLite `books` table and get passed
//! throughout the TUI. These stay light-weight data holders so the store and
//! the presentation layer can focus on their own concerns.

use std::fmt;

use chrono::NaiveDateTime;

/// A physical book as persisted in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    /// Storage id. Renumbered by the store whenever a lower id is deleted, so
    /// it is only meaningful until the next delete.
    pub id: i64,
    pub title: String,
    pub author: String,
    pub year: i32,
    /// Optional text columns come back as empty strings when NULL.
    pub genre: String,
    pub publisher: String,
    pub isbn: String,
    pub quantity: i64,
    /// Upper-cased letters naming the rack.
    pub rack: String,
    /// Digits naming the shelf within the rack.
    pub shelf: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Book {
    /// Combined `rack`/`shelf` placement, e.g. `B-12`. Either half may be
    /// missing, in which case no separator is printed.
    pub fn placement(&self) -> String {
        match (self.rack.is_empty(), self.shelf.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.rack.clone(),
            (true, false) => self.shelf.clone(),
            (false, false) => format!("{}-{}", self.rack, self.shelf),
        }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.author)
    }
}

/// One row of a query result. `display_index` is the 1-based position inside
/// that particular result set and is unrelated to the storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub display_index: usize,
    pub book: Book,
}

/// Attach display indices `1..=N` to a result set in its current order.
pub fn number_rows(books: Vec<Book>) -> Vec<CatalogRow> {
    books
        .into_iter()
        .enumerate()
        .map(|(idx, book)| CatalogRow {
            display_index: idx + 1,
            book,
        })
        .collect()
}

/// A record that passed validation and may be written to the store. The
/// fields are private so the only way to obtain one is through
/// [`crate::validation::BookDraft::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) year: i32,
    pub(crate) genre: String,
    pub(crate) publisher: String,
    pub(crate) isbn: String,
    pub(crate) quantity: i64,
    pub(crate) rack: String,
    pub(crate) shelf: String,
}

impl NewBook {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn rack(&self) -> &str {
        &self.rack
    }

    pub fn shelf(&self) -> &str {
        &self.shelf
    }
}

/// Columns that substring search may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    #[default]
    Title,
    Author,
    Genre,
    Isbn,
    Year,
}

impl SearchField {
    pub const ALL: [SearchField; 5] = [
        SearchField::Title,
        SearchField::Author,
        SearchField::Genre,
        SearchField::Isbn,
        SearchField::Year,
    ];

    pub fn column(self) -> &'static str {
        match self {
            SearchField::Title => "title",
            SearchField::Author => "author",
            SearchField::Genre => "genre",
            SearchField::Isbn => "isbn",
            SearchField::Year => "year",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchField::Title => "Title",
            SearchField::Author => "Author",
            SearchField::Genre => "Genre",
            SearchField::Isbn => "ISBN",
            SearchField::Year => "Year",
        }
    }

    /// Next field in the allow-list, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl From<&str> for SearchField {
    /// Any name outside the allow-list searches titles.
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "author" => SearchField::Author,
            "genre" => SearchField::Genre,
            "isbn" => SearchField::Isbn,
            "year" => SearchField::Year,
            _ => SearchField::Title,
        }
    }
}

/// Columns offered by the combined filter and its choice lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    Genre,
    Author,
    Year,
    Rack,
}

impl FilterColumn {
    pub const ALL: [FilterColumn; 4] = [
        FilterColumn::Genre,
        FilterColumn::Author,
        FilterColumn::Year,
        FilterColumn::Rack,
    ];

    pub fn column(self) -> &'static str {
        match self {
            FilterColumn::Genre => "genre",
            FilterColumn::Author => "author",
            FilterColumn::Year => "year",
            FilterColumn::Rack => "rack",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FilterColumn::Genre => "Genre",
            FilterColumn::Author => "Author",
            FilterColumn::Year => "Year",
            FilterColumn::Rack => "Rack",
        }
    }
}

/// Exact-match constraints for the combined filter. Absent constraints do not
/// restrict the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub genre: Option<String>,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub rack: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.genre.is_none() && self.author.is_none() && self.year.is_none() && self.rack.is_none()
    }

    /// Current constraint for a column, rendered as text.
    pub fn get(&self, column: FilterColumn) -> Option<String> {
        match column {
            FilterColumn::Genre => self.genre.clone(),
            FilterColumn::Author => self.author.clone(),
            FilterColumn::Year => self.year.map(|year| year.to_string()),
            FilterColumn::Rack => self.rack.clone(),
        }
    }

    /// Set or clear a constraint from its textual form. A year that does not
    /// parse clears the constraint.
    pub fn set(&mut self, column: FilterColumn, value: Option<String>) {
        match column {
            FilterColumn::Genre => self.genre = value,
            FilterColumn::Author => self.author = value,
            FilterColumn::Year => self.year = value.and_then(|v| v.trim().parse().ok()),
            FilterColumn::Rack => self.rack = value,
        }
    }

    /// Short human summary, e.g. `genre=Fiction, year=2001`.
    pub fn describe(&self) -> String {
        FilterColumn::ALL
            .iter()
            .filter_map(|column| {
                self.get(*column)
                    .map(|value| format!("{}={}", column.column(), value))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Split a legacy combined `location` value into `(rack, shelf)`.
///
/// The value is cut at its last non-alphanumeric character (`"A-12"`,
/// `"B / 3"`). Without such a separator, a leading run of letters becomes the
/// rack and the remainder the shelf (`"C7"`). The halves are then normalized:
/// only letters survive in the rack (upper-cased) and only digits in the shelf.
pub fn split_location(location: &str) -> (String, String) {
    let trimmed = location.trim();
    let (rack_raw, shelf_raw) = match trimmed
        .char_indices()
        .filter(|(_, ch)| !ch.is_alphanumeric())
        .last()
    {
        Some((idx, ch)) => (&trimmed[..idx], &trimmed[idx + ch.len_utf8()..]),
        None => {
            let split = trimmed
                .char_indices()
                .find(|(_, ch)| !ch.is_alphabetic())
                .map(|(idx, _)| idx)
                .unwrap_or(trimmed.len());
            trimmed.split_at(split)
        }
    };

    let rack = rack_raw
        .chars()
        .filter(|ch| ch.is_alphabetic())
        .flat_map(char::to_uppercase)
        .collect();
    let shelf = shelf_raw.chars().filter(|ch| ch.is_ascii_digit()).collect();
    (rack, shelf)
}
