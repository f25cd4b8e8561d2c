//! Application state and rendering for the catalog TUI.
//!
//! `App` owns the open [`Catalog`] plus an in-memory mirror of every book,
//! and keeps a second list for whatever the current view (all, search or
//! filter) selected. Keys are dispatched by `Mode`: the current mode is
//! taken out, handled, and the returned mode stored back, so each dialog
//! owns its form state while it is open. Store changes always reload both
//! lists from the database, since a delete renumbers ids.

use std::cmp::min;
use std::mem;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use crossterm::event::KeyCode;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use ratatui::Frame;

use crate::config::{self, ConnectionSettings};
use crate::db::Catalog;
use crate::models::{Book, CatalogRow, FilterColumn, FilterCriteria, SearchField};
use crate::transfer::{export_books, ImportBatch};

use super::forms::{
    BookField, BookForm, ConfirmDelete, ConfirmImport, FilterForm, PathPrompt, PathPurpose,
    SearchState, SettingsField, SettingsForm,
};
use super::helpers::{centered_rect, surface_error, truncate};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows skipped by PageUp/PageDown.
const PAGE_STEP: isize = 10;
/// File name suggested by the import/export prompts.
const DEFAULT_EXPORT_FILE: &str = "books.json";
const NOT_CONNECTED: &str = "Not connected to a catalog. Press c to edit connection settings.";

/// Which query produced the rows currently on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
enum View {
    All,
    Search { field: SearchField, query: String },
    Filter(FilterCriteria),
}

/// Fine-grained modes layered over the catalog table.
enum Mode {
    Normal,
    AddingBook(BookForm),
    EditingBook { id: i64, form: BookForm },
    ConfirmDelete(ConfirmDelete),
    Searching(SearchState),
    Filtering(FilterForm),
    PromptingPath(PathPrompt),
    ConfirmImport(ConfirmImport),
    EditingSettings(SettingsForm),
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    catalog: Option<Catalog>,
    settings: ConnectionSettings,
    data_dir: PathBuf,
    config_path: PathBuf,
    /// Mirror of the whole catalog, refreshed after every store change.
    books: Vec<Book>,
    /// Rows of the current view with their display indices.
    rows: Vec<CatalogRow>,
    selected: usize,
    view: View,
    mode: Mode,
    status: Option<StatusMessage>,
    /// Set while the first failed connection waits for corrected settings.
    awaiting_retry: bool,
}

impl App {
    /// Try to connect with `settings`. On failure the settings dialog opens so
    /// the user can correct them; saving retries the connection once.
    pub fn new(settings: ConnectionSettings, data_dir: PathBuf, config_path: PathBuf) -> Self {
        match Catalog::open(&settings, &data_dir) {
            Ok(catalog) => Self::with_catalog(Some(catalog), settings, data_dir, config_path),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "initial connection failed");
                let mut app = Self::with_catalog(None, settings, data_dir, config_path);
                app.awaiting_retry = true;
                app.mode = Mode::EditingSettings(SettingsForm::from_settings(&app.settings));
                app.set_status(
                    format!("Could not connect: {}", surface_error(&err)),
                    StatusKind::Error,
                );
                app
            }
        }
    }

    /// Build the state around an already opened catalog (or none).
    pub fn with_catalog(
        catalog: Option<Catalog>,
        settings: ConnectionSettings,
        data_dir: PathBuf,
        config_path: PathBuf,
    ) -> Self {
        let mut app = Self {
            catalog,
            settings,
            data_dir,
            config_path,
            books: Vec::new(),
            rows: Vec::new(),
            selected: 0,
            view: View::All,
            mode: Mode::Normal,
            status: None,
            awaiting_retry: false,
        };
        app.reload(None);
        if app.catalog.is_some() {
            app.set_status(
                format!("Ready. Loaded {} books.", app.books.len()),
                StatusKind::Info,
            );
        }
        app
    }

    /// Release the catalog handle before the process exits.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.catalog.take() {
            Some(catalog) => catalog.close(),
            None => Ok(()),
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mut mode = mem::replace(&mut self.mode, Mode::Normal);

        mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::AddingBook(form) => self.handle_add_book(code, form)?,
            Mode::EditingBook { id, form } => self.handle_edit_book(code, id, form)?,
            Mode::ConfirmDelete(confirm) => self.handle_confirm_delete(code, confirm)?,
            Mode::Searching(state) => self.handle_search(code, state)?,
            Mode::Filtering(form) => self.handle_filter(code, form)?,
            Mode::PromptingPath(prompt) => self.handle_path_prompt(code, prompt)?,
            Mode::ConfirmImport(confirm) => self.handle_confirm_import(code, confirm)?,
            Mode::EditingSettings(form) => self.handle_settings(code, form)?,
        };

        self.mode = mode;
        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Char('q') => *exit = true,
            KeyCode::Esc => {
                if self.view == View::All {
                    *exit = true;
                } else {
                    self.reset_view();
                }
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-PAGE_STEP),
            KeyCode::PageDown => self.move_selection(PAGE_STEP),
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = self.rows.len().saturating_sub(1),
            KeyCode::Char('c') | KeyCode::Char('C') => {
                self.clear_status();
                return Ok(Mode::EditingSettings(SettingsForm::from_settings(
                    &self.settings,
                )));
            }
            _ if self.catalog.is_none() => {
                if matches!(code, KeyCode::Char(_) | KeyCode::Enter | KeyCode::Delete) {
                    self.set_status(NOT_CONNECTED, StatusKind::Error);
                }
            }
            KeyCode::Char('a') | KeyCode::Char('A') => {
                self.clear_status();
                return Ok(Mode::AddingBook(BookForm::default()));
            }
            KeyCode::Char('e') | KeyCode::Char('E') | KeyCode::Enter => {
                if let Some(mode) = self.current_book().map(|book| Mode::EditingBook {
                    id: book.id,
                    form: BookForm::from_book(book),
                }) {
                    self.clear_status();
                    return Ok(mode);
                }
                self.set_status("No book selected to edit.", StatusKind::Error);
            }
            KeyCode::Char('d') | KeyCode::Char('D') | KeyCode::Delete => {
                if let Some(confirm) = self.current_book().map(ConfirmDelete::from) {
                    self.clear_status();
                    return Ok(Mode::ConfirmDelete(confirm));
                }
                self.set_status("No book selected to delete.", StatusKind::Error);
            }
            KeyCode::Char('/') => {
                let state = match &self.view {
                    View::Search { field, query } => SearchState {
                        field: *field,
                        query: query.clone(),
                    },
                    _ => SearchState::default(),
                };
                return Ok(Mode::Searching(state));
            }
            KeyCode::Char('f') | KeyCode::Char('F') => {
                return Ok(self.open_filter_dialog());
            }
            KeyCode::Char('r') | KeyCode::Char('R') => self.reset_view(),
            KeyCode::Char('i') | KeyCode::Char('I') => {
                self.clear_status();
                return Ok(Mode::PromptingPath(PathPrompt::new(
                    PathPurpose::Import,
                    DEFAULT_EXPORT_FILE,
                )));
            }
            KeyCode::Char('x') | KeyCode::Char('X') => {
                if self.books.is_empty() {
                    self.set_status("No books to export.", StatusKind::Error);
                } else {
                    self.clear_status();
                    return Ok(Mode::PromptingPath(PathPrompt::new(
                        PathPurpose::Export,
                        DEFAULT_EXPORT_FILE,
                    )));
                }
            }
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_add_book(&mut self, code: KeyCode, mut form: BookForm) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                self.set_status("Add book cancelled.", StatusKind::Info);
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.prev_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.save_new_book(&form) {
                Ok(_) => keep_open = false,
                Err(err) => {
                    let message = surface_error(&err);
                    form.error = Some(message.clone());
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        if keep_open {
            Ok(Mode::AddingBook(form))
        } else {
            Ok(Mode::Normal)
        }
    }

    fn handle_edit_book(&mut self, code: KeyCode, id: i64, mut form: BookForm) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                self.set_status("Edit cancelled.", StatusKind::Info);
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.prev_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.save_existing_book(id, &form) {
                Ok(_) => keep_open = false,
                Err(err) => {
                    let message = surface_error(&err);
                    form.error = Some(message.clone());
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        if keep_open {
            Ok(Mode::EditingBook { id, form })
        } else {
            Ok(Mode::Normal)
        }
    }

    fn handle_confirm_delete(&mut self, code: KeyCode, confirm: ConfirmDelete) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Deletion cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.perform_delete(&confirm) {
                    Ok(_) => Ok(Mode::Normal),
                    Err(err) => {
                        self.set_status(surface_error(&err), StatusKind::Error);
                        Ok(Mode::Normal)
                    }
                }
            }
            _ => Ok(Mode::ConfirmDelete(confirm)),
        }
    }

    fn handle_search(&mut self, code: KeyCode, mut state: SearchState) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.clear_status();
                return Ok(Mode::Normal);
            }
            KeyCode::Tab => state.field = state.field.next(),
            KeyCode::Backspace => {
                state.query.pop();
            }
            KeyCode::Enter => {
                if state.query.trim().is_empty() {
                    self.set_status("Enter text to search for.", StatusKind::Error);
                    return Ok(Mode::Searching(state));
                }
                self.run_search(state.field, state.query.trim().to_string());
                return Ok(Mode::Normal);
            }
            KeyCode::Char(ch) if !ch.is_control() => state.query.push(ch),
            _ => {}
        }
        Ok(Mode::Searching(state))
    }

    fn handle_filter(&mut self, code: KeyCode, mut form: FilterForm) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.set_status("Filter unchanged.", StatusKind::Info);
                return Ok(Mode::Normal);
            }
            KeyCode::Up | KeyCode::BackTab => form.move_focus(-1),
            KeyCode::Down | KeyCode::Tab => form.move_focus(1),
            KeyCode::Left => form.cycle_active(-1),
            KeyCode::Right | KeyCode::Char(' ') => form.cycle_active(1),
            KeyCode::Backspace | KeyCode::Delete => form.clear_active(),
            KeyCode::Enter => {
                self.apply_filter(form.criteria());
                return Ok(Mode::Normal);
            }
            _ => {}
        }
        Ok(Mode::Filtering(form))
    }

    fn handle_path_prompt(&mut self, code: KeyCode, mut prompt: PathPrompt) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.set_status(
                    format!("{} cancelled.", prompt.purpose.title()),
                    StatusKind::Info,
                );
                Ok(Mode::Normal)
            }
            KeyCode::Backspace => {
                prompt.path.pop();
                prompt.error = None;
                Ok(Mode::PromptingPath(prompt))
            }
            KeyCode::Enter => {
                let outcome = match prompt.purpose {
                    PathPurpose::Export => self.export_to(&prompt).map(|_| Mode::Normal),
                    PathPurpose::Import => self.load_import(&prompt).map(Mode::ConfirmImport),
                };
                match outcome {
                    Ok(mode) => Ok(mode),
                    Err(err) => {
                        let message = surface_error(&err);
                        prompt.error = Some(message.clone());
                        self.set_status(message, StatusKind::Error);
                        Ok(Mode::PromptingPath(prompt))
                    }
                }
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                prompt.path.push(ch);
                prompt.error = None;
                Ok(Mode::PromptingPath(prompt))
            }
            _ => Ok(Mode::PromptingPath(prompt)),
        }
    }

    fn handle_confirm_import(&mut self, code: KeyCode, confirm: ConfirmImport) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Import cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Err(err) = self.perform_import(confirm) {
                    self.set_status(surface_error(&err), StatusKind::Error);
                }
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::ConfirmImport(confirm)),
        }
    }

    fn handle_settings(&mut self, code: KeyCode, mut form: SettingsForm) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                if self.catalog.is_none() {
                    self.set_status(NOT_CONNECTED, StatusKind::Error);
                } else {
                    self.set_status("Connection settings unchanged.", StatusKind::Info);
                }
                self.awaiting_retry = false;
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.prev_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.save_settings(&form) {
                Ok(_) => keep_open = false,
                Err(err) => {
                    let message = surface_error(&err);
                    form.error = Some(message.clone());
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        if keep_open {
            Ok(Mode::EditingSettings(form))
        } else {
            Ok(Mode::Normal)
        }
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let footer_height = FOOTER_HEIGHT.min(area.height);

        let (content_area, footer_area) = if area.height > footer_height {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(footer_height)])
                .split(area);
            (chunks[0], chunks[1])
        } else {
            (area, area)
        };

        self.draw_table(frame, content_area);

        if area.height >= footer_height {
            self.draw_footer(frame, footer_area);
        }

        match &self.mode {
            Mode::AddingBook(form) => self.draw_book_form(frame, area, "Add Book", form),
            Mode::EditingBook { form, .. } => self.draw_book_form(frame, area, "Edit Book", form),
            Mode::ConfirmDelete(confirm) => self.draw_confirm_delete(frame, area, confirm),
            Mode::Searching(state) => self.draw_search_bar(frame, area, state),
            Mode::Filtering(form) => self.draw_filter(frame, area, form),
            Mode::PromptingPath(prompt) => self.draw_path_prompt(frame, area, prompt),
            Mode::ConfirmImport(confirm) => self.draw_confirm_import(frame, area, confirm),
            Mode::EditingSettings(form) => self.draw_settings(frame, area, form),
            Mode::Normal => {}
        }
    }

    fn draw_table(&self, frame: &mut Frame, area: Rect) {
        let title = match &self.view {
            View::All => match self.catalog.as_ref().and_then(Catalog::path) {
                Some(path) => format!(" Catalog: {} ", display_name(path)),
                None => format!(" Catalog: {} ", self.settings.database),
            },
            View::Search { field, query } => {
                format!(" Search: {} contains \"{}\" ", field.label(), query)
            }
            View::Filter(criteria) => format!(" Filter: {} ", criteria.describe()),
        };
        let block = Block::default().borders(Borders::ALL).title(title);

        if self.rows.is_empty() {
            let message = if self.catalog.is_none() {
                NOT_CONNECTED
            } else if self.view == View::All {
                "No books yet. Press 'a' to add one or 'i' to import."
            } else {
                "No books match. Press 'r' to show all books."
            };
            let paragraph = Paragraph::new(message)
                .alignment(Alignment::Center)
                .block(block)
                .wrap(Wrap { trim: true });
            frame.render_widget(paragraph, area);
            return;
        }

        let header_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let header = Row::new(
            [
                "#",
                "Title",
                "Author",
                "Year",
                "Genre",
                "Publisher",
                "ISBN",
                "Qty",
                "Rack",
                "Shelf",
            ]
            .into_iter()
            .map(Cell::from),
        )
        .style(header_style);

        let rows = self.rows.iter().map(|row| {
            let book = &row.book;
            Row::new(vec![
                Cell::from(row.display_index.to_string()),
                Cell::from(truncate(&book.title, 40)),
                Cell::from(truncate(&book.author, 28)),
                Cell::from(book.year.to_string()),
                Cell::from(truncate(&book.genre, 18)),
                Cell::from(truncate(&book.publisher, 20)),
                Cell::from(book.isbn.clone()),
                Cell::from(book.quantity.to_string()),
                Cell::from(book.rack.clone()),
                Cell::from(book.shelf.clone()),
            ])
        });

        let widths = [
            Constraint::Length(5),
            Constraint::Percentage(26),
            Constraint::Percentage(18),
            Constraint::Length(5),
            Constraint::Percentage(12),
            Constraint::Percentage(13),
            Constraint::Length(17),
            Constraint::Length(4),
            Constraint::Length(5),
            Constraint::Length(5),
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");

        let mut state = TableState::default().with_selected(Some(self.selected));
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let count = format!("Showing {} of {} books.", self.rows.len(), self.books.len());
        let status_line = match &self.status {
            Some(status) => Line::from(vec![
                Span::styled(status.text.clone(), status.kind.style()),
                Span::styled(format!("  {count}"), Style::default().fg(Color::Gray)),
            ]),
            None => Line::from(count),
        };

        let instructions = self.footer_instructions();

        let paragraph = Paragraph::new(vec![status_line, instructions]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let keys: &[(&str, &str)] = match &self.mode {
            Mode::AddingBook(_) | Mode::EditingBook { .. } | Mode::EditingSettings(_) => &[
                ("[Tab/↑↓]", " Field   "),
                ("[Enter]", " Save   "),
                ("[Esc]", " Cancel"),
            ],
            Mode::Searching(_) => &[
                ("[Tab]", " Field   "),
                ("[Enter]", " Search   "),
                ("[Esc]", " Cancel"),
            ],
            Mode::Filtering(_) => &[
                ("[↑↓]", " Column   "),
                ("[←→]", " Value   "),
                ("[Del]", " Any   "),
                ("[Enter]", " Apply   "),
                ("[Esc]", " Cancel"),
            ],
            Mode::PromptingPath(_) => &[("[Enter]", " Confirm   "), ("[Esc]", " Cancel")],
            Mode::ConfirmDelete(_) | Mode::ConfirmImport(_) => {
                &[("[Y]", " Confirm   "), ("[N/Esc]", " Cancel")]
            }
            Mode::Normal => &[
                ("[a]", " Add   "),
                ("[e]", " Edit   "),
                ("[d]", " Delete   "),
                ("[/]", " Search   "),
                ("[f]", " Filter   "),
                ("[r]", " Reset   "),
                ("[i]", " Import   "),
                ("[x]", " Export   "),
                ("[c]", " Connection   "),
                ("[q]", " Quit"),
            ],
        };

        Line::from(
            keys.iter()
                .flat_map(|(key, label)| {
                    [
                        Span::styled(key.to_string(), key_style),
                        Span::raw(label.to_string()),
                    ]
                })
                .collect::<Vec<_>>(),
        )
    }

    fn draw_book_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &BookForm) {
        let popup_area = centered_rect(60, 60, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title(title).borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines: Vec<Line<'static>> = BookField::ALL
            .iter()
            .map(|field| form.build_line(*field))
            .collect();
        lines.push(Line::from(""));
        lines.push(error_or_hint(
            form.error.as_deref(),
            "Enter to save • Tab to switch fields • Esc to cancel",
        ));

        frame.render_widget(Paragraph::new(lines), inner);

        let (dx, dy) = form.cursor_offset();
        frame.set_cursor_position((inner.x + dx, inner.y + dy));
    }

    fn draw_settings(&self, frame: &mut Frame, area: Rect, form: &SettingsForm) {
        let popup_area = centered_rect(60, 45, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title("Connection Settings")
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines: Vec<Line<'static>> = SettingsField::ALL
            .iter()
            .map(|field| form.build_line(*field))
            .collect();
        lines.push(Line::from(""));
        lines.push(error_or_hint(
            form.error.as_deref(),
            "Enter to save and reconnect • Esc to cancel",
        ));

        frame.render_widget(Paragraph::new(lines), inner);

        let (dx, dy) = form.cursor_offset();
        frame.set_cursor_position((inner.x + dx, inner.y + dy));
    }

    fn draw_confirm_delete(&self, frame: &mut Frame, area: Rect, confirm: &ConfirmDelete) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title("Confirm Deletion")
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines = vec![Line::from(format!("Delete {}?", confirm.label))];
        if !confirm.placement.is_empty() {
            lines.push(Line::from(format!("Shelved at {}.", confirm.placement)));
        }
        lines.extend([
            Line::from("Books after it will be renumbered."),
            Line::from(""),
            Line::from(Span::styled(
                "Press Y to confirm or N / Esc to cancel.",
                Style::default().fg(Color::Gray),
            )),
        ]);

        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn draw_confirm_import(&self, frame: &mut Frame, area: Rect, confirm: &ConfirmImport) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title("Confirm Import").borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let lines = vec![
            Line::from(format!(
                "Found {} records in {}.",
                confirm.batch.len(),
                confirm.path.display()
            )),
            Line::from("Add them to the existing catalog?"),
            Line::from(""),
            Line::from(Span::styled(
                "Press Y to confirm or N / Esc to cancel.",
                Style::default().fg(Color::Gray),
            )),
        ];

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, state: &SearchState) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Search by {} (Tab to change)", state.field.label()));
        let paragraph = Paragraph::new(Span::raw(format!("Search: {}", state.query)))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + state.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }

    fn draw_filter(&self, frame: &mut Frame, area: Rect, form: &FilterForm) {
        let popup_area = centered_rect(50, 35, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title("Filter").borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines: Vec<Line<'static>> =
            (0..form.choices.len()).map(|idx| form.build_line(idx)).collect();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "All chosen values must match.",
            Style::default().fg(Color::Gray),
        )));

        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn draw_path_prompt(&self, frame: &mut Frame, area: Rect, prompt: &PathPrompt) {
        let popup_area = centered_rect(70, 25, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(prompt.purpose.title())
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let lines = vec![
            Line::from(format!("File: {}", prompt.path)),
            Line::from(""),
            error_or_hint(
                prompt.error.as_deref(),
                "Relative paths resolve against the current directory.",
            ),
        ];
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);

        let cursor_x = inner.x + "File: ".len() as u16 + prompt.path.chars().count() as u16;
        frame.set_cursor_position((min(cursor_x, inner.right().saturating_sub(1)), inner.y));
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    fn catalog(&self) -> Result<&Catalog> {
        self.catalog.as_ref().ok_or_else(|| anyhow!(NOT_CONNECTED))
    }

    fn save_new_book(&mut self, form: &BookForm) -> Result<()> {
        let book = form.parse_inputs()?;
        let id = self.catalog()?.insert(&book)?;
        self.reload(Some(id));
        self.set_status(
            format!("Added \"{}\" as book {id}.", book.title()),
            StatusKind::Info,
        );
        Ok(())
    }

    fn save_existing_book(&mut self, id: i64, form: &BookForm) -> Result<()> {
        let book = form.parse_inputs()?;
        self.catalog()?.update(id, &book)?;
        self.reload(Some(id));
        self.set_status(format!("Updated \"{}\".", book.title()), StatusKind::Info);
        Ok(())
    }

    fn perform_delete(&mut self, confirm: &ConfirmDelete) -> Result<()> {
        self.catalog
            .as_mut()
            .ok_or_else(|| anyhow!(NOT_CONNECTED))?
            .delete(confirm.id)?;
        self.reload(None);
        self.set_status(format!("Deleted \"{}\".", confirm.title), StatusKind::Info);
        Ok(())
    }

    fn run_search(&mut self, field: SearchField, query: String) {
        self.view = View::Search { field, query };
        self.selected = 0;
        self.reload(None);
        if self.status.is_none() {
            if self.rows.is_empty() {
                self.set_status("No books match the search.", StatusKind::Info);
            } else {
                self.set_status(format!("Found {} books.", self.rows.len()), StatusKind::Info);
            }
        }
    }

    /// Distinct values offered by each filter column.
    fn filter_options(&self) -> Result<Vec<(FilterColumn, Vec<String>)>> {
        let catalog = self.catalog()?;
        FilterColumn::ALL
            .into_iter()
            .map(|column| {
                catalog
                    .distinct_values(column)
                    .map(|values| (column, values))
            })
            .collect()
    }

    fn open_filter_dialog(&mut self) -> Mode {
        let options = match self.filter_options() {
            Ok(options) => options,
            Err(err) => {
                self.set_status(surface_error(&err), StatusKind::Error);
                return Mode::Normal;
            }
        };

        let current = match &self.view {
            View::Filter(criteria) => criteria.clone(),
            _ => FilterCriteria::default(),
        };
        self.clear_status();
        Mode::Filtering(FilterForm::new(options, &current))
    }

    fn apply_filter(&mut self, criteria: FilterCriteria) {
        self.view = if criteria.is_empty() {
            View::All
        } else {
            View::Filter(criteria)
        };
        self.selected = 0;
        self.reload(None);
        if self.status.is_none() {
            self.set_status(
                format!("Filter shows {} books.", self.rows.len()),
                StatusKind::Info,
            );
        }
    }

    fn reset_view(&mut self) {
        self.view = View::All;
        self.selected = 0;
        self.reload(None);
        self.set_status("Showing all books.", StatusKind::Info);
    }

    fn export_to(&mut self, prompt: &PathPrompt) -> Result<()> {
        let path = prompt.parse_inputs()?;
        let count = export_books(&self.books, &path)?;
        self.set_status(
            format!("Exported {count} books to {}.", display_name(&path)),
            StatusKind::Info,
        );
        Ok(())
    }

    fn load_import(&mut self, prompt: &PathPrompt) -> Result<ConfirmImport> {
        let path = prompt.parse_inputs()?;
        let batch = ImportBatch::load(&path)?;
        if batch.is_empty() {
            return Err(anyhow!("{} contains no books.", display_name(&path)));
        }
        self.clear_status();
        Ok(ConfirmImport { path, batch })
    }

    fn perform_import(&mut self, confirm: ConfirmImport) -> Result<()> {
        let report = confirm.batch.apply(self.catalog()?);
        self.reload(None);
        let mut message = format!(
            "Imported {} books from {}.",
            report.inserted,
            display_name(&confirm.path)
        );
        if report.skipped > 0 {
            message.push_str(&format!(" Skipped {}.", report.skipped));
        }
        self.set_status(message, StatusKind::Info);
        Ok(())
    }

    /// Persist new settings, close the current handle, and reconnect.
    fn save_settings(&mut self, form: &SettingsForm) -> Result<()> {
        let settings = form.parse_inputs()?;
        config::save(&self.config_path, &settings)?;
        self.settings = settings;

        if let Some(previous) = self.catalog.take() {
            if let Err(err) = previous.close() {
                tracing::warn!(error = %format!("{err:#}"), "failed to close previous catalog");
            }
        }

        let retrying = mem::take(&mut self.awaiting_retry);
        match Catalog::open(&self.settings, &self.data_dir) {
            Ok(catalog) => {
                self.catalog = Some(catalog);
                self.view = View::All;
                self.selected = 0;
                self.reload(None);
                self.set_status(
                    format!(
                        "Connected to {}. Loaded {} books.",
                        self.settings.describe(),
                        self.books.len()
                    ),
                    StatusKind::Info,
                );
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "reconnect failed");
                self.view = View::All;
                self.reload(None);
                let prefix = if retrying {
                    "Still unable to connect"
                } else {
                    "Could not connect"
                };
                self.set_status(
                    format!("{prefix}: {}. Press c to try again.", surface_error(&err)),
                    StatusKind::Error,
                );
            }
        }
        Ok(())
    }

    /// Refresh the catalog mirror and the current view, keeping the cursor on
    /// `focus_id` when it is part of the result.
    fn reload(&mut self, focus_id: Option<i64>) {
        let Some(catalog) = self.catalog.as_ref() else {
            self.books.clear();
            self.rows.clear();
            self.selected = 0;
            return;
        };

        let all = catalog.list_all();
        let rows = match &self.view {
            View::All => Ok(all.clone()),
            View::Search { field, query } => catalog.search(*field, query),
            View::Filter(criteria) => catalog.filter(criteria),
        };
        self.books = all.into_iter().map(|row| row.book).collect();

        match rows {
            Ok(rows) => self.rows = rows,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to refresh view");
                self.rows.clear();
                self.set_status(surface_error(&err), StatusKind::Error);
            }
        }

        if let Some(id) = focus_id {
            if let Some(idx) = self.rows.iter().position(|row| row.book.id == id) {
                self.selected = idx;
                return;
            }
        }
        if self.selected >= self.rows.len() {
            self.selected = self.rows.len().saturating_sub(1);
        }
    }

    fn current_book(&self) -> Option<&Book> {
        self.rows.get(self.selected).map(|row| &row.book)
    }

    fn move_selection(&mut self, offset: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let max = self.rows.len() as isize - 1;
        self.selected = (self.selected as isize + offset).clamp(0, max) as usize;
    }
}

fn error_or_hint(error: Option<&str>, hint: &str) -> Line<'static> {
    match error {
        Some(error) => Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(Color::Red),
        )),
        None => Line::from(Span::styled(
            hint.to_string(),
            Style::default().fg(Color::Gray),
        )),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn app_with_catalog(dir: &TempDir) -> App {
        App::with_catalog(
            Some(Catalog::open_in_memory().unwrap()),
            ConnectionSettings::default(),
            dir.path().to_path_buf(),
            config::config_path(dir.path()),
        )
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            app.handle_key(KeyCode::Char(ch)).unwrap();
        }
    }

    fn add_book(app: &mut App, title: &str, author: &str, year: &str) {
        app.handle_key(KeyCode::Char('a')).unwrap();
        type_text(app, title);
        app.handle_key(KeyCode::Tab).unwrap();
        type_text(app, author);
        app.handle_key(KeyCode::Tab).unwrap();
        type_text(app, year);
        app.handle_key(KeyCode::Enter).unwrap();
    }

    #[test]
    fn adding_books_through_the_form() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);

        add_book(&mut app, "Dune", "Herbert", "1965");
        add_book(&mut app, "Emma", "Austen", "1815");

        assert!(matches!(app.mode, Mode::Normal));
        assert_eq!(app.rows.len(), 2);
        assert_eq!(app.books.len(), 2);
    }

    #[test]
    fn invalid_form_stays_open_without_touching_the_store() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);

        add_book(&mut app, "Dune", "Herbert", "");

        match &app.mode {
            Mode::AddingBook(form) => assert_eq!(form.error.as_deref(), Some("Year is required.")),
            _ => panic!("form should stay open"),
        }
        assert_eq!(app.catalog.as_ref().unwrap().count().unwrap(), 0);
    }

    #[test]
    fn delete_renumbers_visible_rows() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);
        for title in ["A", "B", "C"] {
            add_book(&mut app, title, "X", "2000");
        }

        app.selected = 1;
        app.handle_key(KeyCode::Char('d')).unwrap();
        app.handle_key(KeyCode::Char('y')).unwrap();

        let ids: Vec<i64> = app.rows.iter().map(|row| row.book.id).collect();
        assert_eq!(ids, vec![1, 2]);
        let titles: Vec<&str> = app.rows.iter().map(|row| row.book.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
    }

    #[test]
    fn search_then_reset() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);
        add_book(&mut app, "The Hobbit", "Tolkien", "1937");
        add_book(&mut app, "Emma", "Austen", "1815");

        app.handle_key(KeyCode::Char('/')).unwrap();
        type_text(&mut app, "hobbit");
        app.handle_key(KeyCode::Enter).unwrap();
        assert_eq!(app.rows.len(), 1);
        assert_eq!(app.rows[0].display_index, 1);

        app.handle_key(KeyCode::Char('r')).unwrap();
        assert_eq!(app.view, View::All);
        assert_eq!(app.rows.len(), 2);
    }

    #[test]
    fn filter_dialog_applies_chosen_values() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);
        add_book(&mut app, "Dune", "Herbert", "1965");
        add_book(&mut app, "Emma", "Austen", "1815");

        app.handle_key(KeyCode::Char('f')).unwrap();
        // Genre has no values; move to Author and pick the first (Austen).
        app.handle_key(KeyCode::Down).unwrap();
        app.handle_key(KeyCode::Right).unwrap();
        app.handle_key(KeyCode::Enter).unwrap();

        assert_eq!(
            app.view,
            View::Filter(FilterCriteria {
                author: Some("Austen".into()),
                ..FilterCriteria::default()
            })
        );
        assert_eq!(app.rows.len(), 1);
        assert_eq!(app.rows[0].book.title, "Emma");
    }

    #[test]
    fn export_and_import_through_prompts() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);
        add_book(&mut app, "Dune", "Herbert", "1965");
        let path = dir.path().join("out.json");

        app.handle_key(KeyCode::Char('x')).unwrap();
        for _ in 0..DEFAULT_EXPORT_FILE.len() {
            app.handle_key(KeyCode::Backspace).unwrap();
        }
        type_text(&mut app, &path.display().to_string());
        app.handle_key(KeyCode::Enter).unwrap();
        assert!(path.exists());

        app.handle_key(KeyCode::Char('i')).unwrap();
        for _ in 0..DEFAULT_EXPORT_FILE.len() {
            app.handle_key(KeyCode::Backspace).unwrap();
        }
        type_text(&mut app, &path.display().to_string());
        app.handle_key(KeyCode::Enter).unwrap();
        assert!(matches!(app.mode, Mode::ConfirmImport(_)));
        app.handle_key(KeyCode::Char('y')).unwrap();

        assert_eq!(app.books.len(), 2);
    }

    #[test]
    fn empty_import_file_keeps_prompt_open() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();

        app.handle_key(KeyCode::Char('i')).unwrap();
        for _ in 0..DEFAULT_EXPORT_FILE.len() {
            app.handle_key(KeyCode::Backspace).unwrap();
        }
        type_text(&mut app, &path.display().to_string());
        app.handle_key(KeyCode::Enter).unwrap();

        match &app.mode {
            Mode::PromptingPath(prompt) => {
                assert_eq!(prompt.error.as_deref(), Some("empty.json contains no books."))
            }
            _ => panic!("prompt should stay open"),
        }
    }

    #[test]
    fn failed_connection_opens_settings_then_degrades() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let settings = ConnectionSettings {
            database: blocker.join("nested").display().to_string(),
            ..ConnectionSettings::default()
        };

        let mut app = App::new(
            settings,
            dir.path().to_path_buf(),
            config::config_path(dir.path()),
        );
        assert!(app.catalog.is_none());
        assert!(matches!(app.mode, Mode::EditingSettings(_)));

        // Saving the unchanged settings retries once and falls back to the
        // empty read-only view.
        app.handle_key(KeyCode::Enter).unwrap();
        assert!(matches!(app.mode, Mode::Normal));
        assert!(app.catalog.is_none());
        assert!(app.rows.is_empty());

        app.handle_key(KeyCode::Char('a')).unwrap();
        assert!(matches!(app.mode, Mode::Normal));
    }

    #[test]
    fn saving_settings_reconnects() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with_catalog(&dir);

        app.handle_key(KeyCode::Char('c')).unwrap();
        app.handle_key(KeyCode::Enter).unwrap();

        assert!(matches!(app.mode, Mode::Normal));
        let catalog = app.catalog.as_ref().unwrap();
        assert_eq!(
            catalog.path(),
            Some(dir.path().join("library_db.sqlite").as_path())
        );
        assert!(config::config_path(dir.path()).exists());
    }
}
