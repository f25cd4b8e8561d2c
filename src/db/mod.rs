//! SQLite persistence: schema upkeep, book queries and the catalog handle.

mod books;
mod connection;
mod schema;

pub use books::{
    count_books, delete_book, distinct_values, fetch_book, fetch_books, filter_books, insert_book,
    search_books, update_book,
};
pub use connection::{open_connection, open_connection_in_memory, Catalog};
pub use schema::{detect_schema_state, ensure_books_schema, SchemaState, SCHEMA_VERSION};
