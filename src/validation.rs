//! Input validation for book records. Everything the user (or an import file)
//! provides passes through [`BookDraft::validate`] before it can reach the
//! store.

use chrono::{Datelike, Local};
use thiserror::Error;

use crate::models::{Book, NewBook};

/// Reasons a draft is rejected. Messages are shown verbatim in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required.")]
    Required(&'static str),
    #[error("Year must be a number.")]
    YearNotNumeric,
    #[error("Year must be between 0 and {max}.")]
    YearOutOfRange { max: i32 },
    #[error("Quantity must be a number.")]
    QuantityNotNumeric,
    #[error("Quantity must be at least 1.")]
    QuantityTooSmall,
    #[error("Rack may only contain letters.")]
    RackNotAlphabetic,
    #[error("Shelf may only contain digits.")]
    ShelfNotNumeric,
}

/// Raw, unvalidated book fields as typed into the form or read from a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub year: String,
    pub genre: String,
    pub publisher: String,
    pub isbn: String,
    pub quantity: String,
    pub rack: String,
    pub shelf: String,
}

impl BookDraft {
    /// Seed a draft from a stored book, used when editing.
    pub fn from_book(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            year: book.year.to_string(),
            genre: book.genre.clone(),
            publisher: book.publisher.clone(),
            isbn: book.isbn.clone(),
            quantity: book.quantity.to_string(),
            rack: book.rack.clone(),
            shelf: book.shelf.clone(),
        }
    }

    /// Validate against the current calendar year.
    pub fn validate(&self) -> Result<NewBook, ValidationError> {
        self.validate_until(Local::now().year())
    }

    /// Validate with an explicit upper bound for the publication year.
    pub fn validate_until(&self, max_year: i32) -> Result<NewBook, ValidationError> {
        let title = required(&self.title, "Title")?;
        let author = required(&self.author, "Author")?;

        let year_raw = required(&self.year, "Year")?;
        let year = year_raw
            .parse::<i32>()
            .map_err(|_| ValidationError::YearNotNumeric)?;
        if !(0..=max_year).contains(&year) {
            return Err(ValidationError::YearOutOfRange { max: max_year });
        }

        let quantity_raw = self.quantity.trim();
        let quantity = if quantity_raw.is_empty() {
            1
        } else {
            quantity_raw
                .parse::<i64>()
                .map_err(|_| ValidationError::QuantityNotNumeric)?
        };
        if quantity < 1 {
            return Err(ValidationError::QuantityTooSmall);
        }

        let rack = self.rack.trim();
        if !rack.chars().all(char::is_alphabetic) {
            return Err(ValidationError::RackNotAlphabetic);
        }
        let shelf = self.shelf.trim();
        if !shelf.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(ValidationError::ShelfNotNumeric);
        }

        Ok(NewBook {
            title,
            author,
            year,
            genre: self.genre.trim().to_string(),
            publisher: self.publisher.trim().to_string(),
            isbn: self.isbn.trim().to_string(),
            quantity,
            rack: rack.to_uppercase(),
            shelf: shelf.to_string(),
        })
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(trimmed.to_string())
    }
}
