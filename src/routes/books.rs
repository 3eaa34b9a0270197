//! Book catalogue API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::library::{
    Book, BookQuery, BookUpdate, CreateBookRequest, FileType, SortBy, SortOrder,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, UNSUPPORTED_FILE_TYPE,
};
use crate::state::AppState;

use super::{required, JsonBody, QueryParams};

/// Create the books router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/:id", get(get_book).put(update_book).delete(delete_book))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBooksParams {
    pub user_id: Option<String>,
    /// Text searched in title, author and description
    pub query: Option<String>,
    /// Comma-separated lists
    pub categories: Option<String>,
    pub authors: Option<String>,
    pub file_types: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct BooksResponse {
    pub books: Vec<Book>,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub book: Book,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// List a user's books
async fn list_books(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListBooksParams>,
) -> Result<Json<BooksResponse>> {
    let user_id = required(params.user_id, "userId")?;

    if let (Some(from), Some(to)) = (params.date_from, params.date_to) {
        if from > to {
            return Err(AppError::BadRequest(
                "dateFrom must not be after dateTo".to_string(),
            ));
        }
    }
    let file_types = split_list(params.file_types)
        .iter()
        .map(|name| {
            FileType::parse(name)
                .ok_or_else(|| AppError::BadRequest(UNSUPPORTED_FILE_TYPE.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    let query = BookQuery {
        search: params.query.filter(|q| !q.trim().is_empty()),
        categories: split_list(params.categories),
        authors: split_list(params.authors),
        file_types,
        created_from: params.date_from,
        created_to: params.date_to,
        sort_by: params.sort_by.unwrap_or_default(),
        sort_order: params.sort_order.unwrap_or_default(),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset: params.offset.unwrap_or(0),
        ..BookQuery::for_user(&user_id)
    };

    let books = state.books().list(&query).await?;
    Ok(Json(BooksResponse { books }))
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Register a new book
async fn create_book(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateBookRequest>,
) -> Result<(StatusCode, Json<BookResponse>)> {
    let new = req.into_new_book(state.config().library.max_file_size)?;
    let book = state.books().create(new).await?;
    Ok((StatusCode::CREATED, Json(BookResponse { book })))
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookResponse>> {
    let book = state
        .books()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;
    Ok(Json(BookResponse { book }))
}

async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<BookUpdate>,
) -> Result<Json<BookResponse>> {
    update.validate()?;
    let book = state
        .books()
        .update(&id, update)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;
    Ok(Json(BookResponse { book }))
}

/// Delete a book together with its reading data
async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    if !state.books().delete(&id).await? {
        return Err(AppError::NotFound(format!("Book not found: {}", id)));
    }
    tracing::info!("Deleted book {}", id);
    Ok(Json(MessageResponse {
        message: "Book deleted successfully",
    }))
}
