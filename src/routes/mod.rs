//! HTTP API routes

pub mod annotations;
pub mod books;
pub mod health;
mod input;
pub mod progress;
pub mod sessions;
pub mod sync;
pub mod users;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};
use crate::state::AppState;

pub(crate) use input::{JsonBody, QueryParams};

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/books", books::router())
        .nest("/api/progress", progress::router())
        .nest("/api/annotations", annotations::router())
        .nest("/api/sessions", sessions::router())
        .nest("/api/users", users::router())
        .nest("/api/sync", sync::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Unwrap a required query parameter
pub(crate) fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{} is required", name)))
}

/// Look up the book a reading record refers to and check the page against it
pub(crate) async fn require_book(
    state: &AppState,
    book_id: &str,
    page: Option<u32>,
) -> Result<crate::library::Book> {
    let book = state
        .books()
        .get(book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", book_id)))?;

    if let Some(page) = page {
        if !book.contains_page(page) {
            return Err(AppError::BadRequest(format!(
                "Page {} is outside the book",
                page
            )));
        }
    }
    Ok(book)
}
