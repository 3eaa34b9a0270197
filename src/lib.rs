//! Novella Server
//!
//! A personal ebook library service: book catalogue, reading progress,
//! annotations, reading sessions and offline-first multi-device sync.

pub mod annotations;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod progress;
pub mod routes;
pub mod state;
pub mod sync;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
