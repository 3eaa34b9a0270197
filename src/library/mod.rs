//! Library module for book management
//!
//! Book model and validation, the catalogue backends and the demo fixtures.

mod book;
mod fixtures;
mod format;
mod store;

pub use book::*;
pub use fixtures::FixtureProvider;
pub use format::*;
pub use store::{BookStore, FixtureBookStore, SqliteBookStore};
