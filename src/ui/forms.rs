//! Input state for the modal dialogs: book form, connection settings,
//! path prompts, search bar and filter picker.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::config::ConnectionSettings;
use crate::models::{Book, FilterColumn, FilterCriteria, NewBook, SearchField};
use crate::transfer::ImportBatch;
use crate::validation::BookDraft;

/// Render one `Label: value` line, highlighting the focused field and
/// greying out empty placeholders.
fn field_line(label: &str, value: &str, placeholder: &str, is_active: bool) -> Line<'static> {
    let display = if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    };

    let style = if is_active {
        Style::default().fg(Color::Yellow)
    } else if value.is_empty() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };

    Line::from(vec![
        Span::raw(format!("{label}: ")),
        Span::styled(display, style),
    ])
}

/// Fields of the book form in focus order.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) enum BookField {
    #[default]
    Title,
    Author,
    Year,
    Genre,
    Publisher,
    Isbn,
    Quantity,
    Rack,
    Shelf,
}

impl BookField {
    pub(crate) const ALL: [BookField; 9] = [
        BookField::Title,
        BookField::Author,
        BookField::Year,
        BookField::Genre,
        BookField::Publisher,
        BookField::Isbn,
        BookField::Quantity,
        BookField::Rack,
        BookField::Shelf,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            BookField::Title => "Title",
            BookField::Author => "Author",
            BookField::Year => "Year",
            BookField::Genre => "Genre",
            BookField::Publisher => "Publisher",
            BookField::Isbn => "ISBN",
            BookField::Quantity => "Quantity",
            BookField::Rack => "Rack",
            BookField::Shelf => "Shelf",
        }
    }

    fn placeholder(self) -> &'static str {
        match self {
            BookField::Title | BookField::Author | BookField::Year => "<required>",
            BookField::Quantity => "1",
            BookField::Rack => "<letters>",
            BookField::Shelf => "<digits>",
            _ => "",
        }
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }
}

/// Form state for adding or editing a book.
#[derive(Default, Clone, Debug)]
pub(crate) struct BookForm {
    pub(crate) draft: BookDraft,
    pub(crate) active: BookField,
    pub(crate) error: Option<String>,
}

impl BookForm {
    /// Populate the form from an existing book when entering edit mode.
    pub(crate) fn from_book(book: &Book) -> Self {
        Self {
            draft: BookDraft::from_book(book),
            ..Self::default()
        }
    }

    pub(crate) fn next_field(&mut self) {
        let idx = (self.active.position() + 1) % BookField::ALL.len();
        self.active = BookField::ALL[idx];
    }

    pub(crate) fn prev_field(&mut self) {
        let len = BookField::ALL.len();
        let idx = (self.active.position() + len - 1) % len;
        self.active = BookField::ALL[idx];
    }

    fn value_mut(&mut self, field: BookField) -> &mut String {
        match field {
            BookField::Title => &mut self.draft.title,
            BookField::Author => &mut self.draft.author,
            BookField::Year => &mut self.draft.year,
            BookField::Genre => &mut self.draft.genre,
            BookField::Publisher => &mut self.draft.publisher,
            BookField::Isbn => &mut self.draft.isbn,
            BookField::Quantity => &mut self.draft.quantity,
            BookField::Rack => &mut self.draft.rack,
            BookField::Shelf => &mut self.draft.shelf,
        }
    }

    pub(crate) fn value(&self, field: BookField) -> &str {
        match field {
            BookField::Title => &self.draft.title,
            BookField::Author => &self.draft.author,
            BookField::Year => &self.draft.year,
            BookField::Genre => &self.draft.genre,
            BookField::Publisher => &self.draft.publisher,
            BookField::Isbn => &self.draft.isbn,
            BookField::Quantity => &self.draft.quantity,
            BookField::Rack => &self.draft.rack,
            BookField::Shelf => &self.draft.shelf,
        }
    }

    /// Append a character to the active field. Numeric fields only take
    /// digits and the rack only takes letters.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        let accepted = match self.active {
            BookField::Year | BookField::Quantity | BookField::Shelf => ch.is_ascii_digit(),
            BookField::Rack => ch.is_alphabetic(),
            _ => true,
        };
        if accepted {
            let field = self.active;
            self.value_mut(field).push(ch);
        }
        accepted
    }

    pub(crate) fn backspace(&mut self) {
        let field = self.active;
        self.value_mut(field).pop();
    }

    /// Validate the inputs and return a record ready for persistence.
    pub(crate) fn parse_inputs(&self) -> Result<NewBook> {
        Ok(self.draft.validate()?)
    }

    pub(crate) fn build_line(&self, field: BookField) -> Line<'static> {
        field_line(
            field.label(),
            self.value(field),
            field.placeholder(),
            self.active == field,
        )
    }

    /// Cursor column offset (in characters) for the active field.
    pub(crate) fn cursor_offset(&self) -> (u16, u16) {
        let field = self.active;
        let prefix = field.label().chars().count() + 2;
        let x = prefix + self.value(field).chars().count();
        (x as u16, field.position() as u16)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ConfirmDelete {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) label: String,
    pub(crate) placement: String,
}

impl ConfirmDelete {
    pub(crate) fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            label: book.to_string(),
            placement: book.placement(),
        }
    }
}

/// Fields of the connection settings dialog.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) enum SettingsField {
    #[default]
    Host,
    User,
    Password,
    Database,
    Port,
}

impl SettingsField {
    pub(crate) const ALL: [SettingsField; 5] = [
        SettingsField::Host,
        SettingsField::User,
        SettingsField::Password,
        SettingsField::Database,
        SettingsField::Port,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            SettingsField::Host => "Host",
            SettingsField::User => "User",
            SettingsField::Password => "Password",
            SettingsField::Database => "Database",
            SettingsField::Port => "Port",
        }
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }
}

/// Editable copy of the connection settings.
#[derive(Default, Clone, Debug)]
pub(crate) struct SettingsForm {
    pub(crate) host: String,
    pub(crate) user: String,
    pub(crate) password: String,
    pub(crate) database: String,
    pub(crate) port: String,
    pub(crate) active: SettingsField,
    pub(crate) error: Option<String>,
}

impl SettingsForm {
    pub(crate) fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            host: settings.host.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            database: settings.database.clone(),
            port: settings.port.to_string(),
            active: SettingsField::Host,
            error: None,
        }
    }

    pub(crate) fn next_field(&mut self) {
        let idx = (self.active.position() + 1) % SettingsField::ALL.len();
        self.active = SettingsField::ALL[idx];
    }

    pub(crate) fn prev_field(&mut self) {
        let len = SettingsField::ALL.len();
        let idx = (self.active.position() + len - 1) % len;
        self.active = SettingsField::ALL[idx];
    }

    fn value_mut(&mut self, field: SettingsField) -> &mut String {
        match field {
            SettingsField::Host => &mut self.host,
            SettingsField::User => &mut self.user,
            SettingsField::Password => &mut self.password,
            SettingsField::Database => &mut self.database,
            SettingsField::Port => &mut self.port,
        }
    }

    fn value(&self, field: SettingsField) -> &str {
        match field {
            SettingsField::Host => &self.host,
            SettingsField::User => &self.user,
            SettingsField::Password => &self.password,
            SettingsField::Database => &self.database,
            SettingsField::Port => &self.port,
        }
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() || (self.active == SettingsField::Port && !ch.is_ascii_digit()) {
            return false;
        }
        let field = self.active;
        self.value_mut(field).push(ch);
        true
    }

    pub(crate) fn backspace(&mut self) {
        let field = self.active;
        self.value_mut(field).pop();
    }

    pub(crate) fn parse_inputs(&self) -> Result<ConnectionSettings> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(anyhow!("Host is required."));
        }
        let database = self.database.trim();
        if database.is_empty() {
            return Err(anyhow!("Database is required."));
        }
        let port = self
            .port
            .trim()
            .parse::<u16>()
            .map_err(|_| anyhow!("Port must be a number between 0 and 65535."))?;
        Ok(ConnectionSettings {
            host: host.to_string(),
            user: self.user.trim().to_string(),
            password: self.password.clone(),
            database: database.to_string(),
            port,
        })
    }

    pub(crate) fn build_line(&self, field: SettingsField) -> Line<'static> {
        let value = if field == SettingsField::Password {
            "*".repeat(self.password.chars().count())
        } else {
            self.value(field).to_string()
        };
        field_line(field.label(), &value, "", self.active == field)
    }

    pub(crate) fn cursor_offset(&self) -> (u16, u16) {
        let field = self.active;
        let prefix = field.label().chars().count() + 2;
        let x = prefix + self.value(field).chars().count();
        (x as u16, field.position() as u16)
    }
}

/// What a path prompt is collecting a path for.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum PathPurpose {
    Import,
    Export,
}

impl PathPurpose {
    pub(crate) fn title(self) -> &'static str {
        match self {
            PathPurpose::Import => "Import from JSON",
            PathPurpose::Export => "Export to JSON",
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct PathPrompt {
    pub(crate) purpose: PathPurpose,
    pub(crate) path: String,
    pub(crate) error: Option<String>,
}

impl PathPrompt {
    pub(crate) fn new(purpose: PathPurpose, suggestion: &str) -> Self {
        Self {
            purpose,
            path: suggestion.to_string(),
            error: None,
        }
    }

    pub(crate) fn parse_inputs(&self) -> Result<PathBuf> {
        let raw = self.path.trim();
        if raw.is_empty() {
            return Err(anyhow!("Enter a file path."));
        }
        Ok(PathBuf::from(raw))
    }
}

/// A parsed import file waiting for the user to confirm.
#[derive(Clone, Debug)]
pub(crate) struct ConfirmImport {
    pub(crate) path: PathBuf,
    pub(crate) batch: ImportBatch,
}

/// State for the inline search bar.
#[derive(Clone, Debug, Default)]
pub(crate) struct SearchState {
    pub(crate) field: SearchField,
    pub(crate) query: String,
}

/// One column of the filter dialog: the available values and the chosen one.
#[derive(Clone, Debug)]
pub(crate) struct FilterChoice {
    pub(crate) column: FilterColumn,
    pub(crate) values: Vec<String>,
    /// Index into `values`; `None` means the column is unconstrained.
    pub(crate) selected: Option<usize>,
}

impl FilterChoice {
    /// Step through `Any, v0, v1, ...` wrapping in both directions.
    pub(crate) fn cycle(&mut self, offset: isize) {
        let slots = self.values.len() as isize + 1;
        let current = self.selected.map(|idx| idx as isize + 1).unwrap_or(0);
        let next = (current + offset).rem_euclid(slots);
        self.selected = if next == 0 {
            None
        } else {
            Some(next as usize - 1)
        };
    }

    pub(crate) fn value(&self) -> Option<&str> {
        self.selected
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }
}

/// The combined filter dialog.
#[derive(Clone, Debug)]
pub(crate) struct FilterForm {
    pub(crate) choices: Vec<FilterChoice>,
    pub(crate) active: usize,
}

impl FilterForm {
    /// Build the dialog from the distinct values of each column, preselecting
    /// whatever `current` already constrains.
    pub(crate) fn new(options: Vec<(FilterColumn, Vec<String>)>, current: &FilterCriteria) -> Self {
        let choices = options
            .into_iter()
            .map(|(column, values)| {
                let selected = current
                    .get(column)
                    .and_then(|wanted| values.iter().position(|v| *v == wanted));
                FilterChoice {
                    column,
                    values,
                    selected,
                }
            })
            .collect();
        Self { choices, active: 0 }
    }

    pub(crate) fn move_focus(&mut self, offset: isize) {
        if self.choices.is_empty() {
            return;
        }
        let len = self.choices.len() as isize;
        self.active = (self.active as isize + offset).rem_euclid(len) as usize;
    }

    pub(crate) fn cycle_active(&mut self, offset: isize) {
        if let Some(choice) = self.choices.get_mut(self.active) {
            choice.cycle(offset);
        }
    }

    pub(crate) fn clear_active(&mut self) {
        if let Some(choice) = self.choices.get_mut(self.active) {
            choice.selected = None;
        }
    }

    pub(crate) fn criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::default();
        for choice in &self.choices {
            criteria.set(choice.column, choice.value().map(str::to_string));
        }
        criteria
    }

    pub(crate) fn build_line(&self, idx: usize) -> Line<'static> {
        let choice = &self.choices[idx];
        let value = choice.value().unwrap_or("Any");
        let is_active = idx == self.active;
        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else if choice.selected.is_none() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        Line::from(vec![
            Span::raw(format!("{}: ", choice.column.label())),
            Span::styled(format!("< {value} >"), style),
        ])
    }
}
