use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, rejection::QueryRejection,
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use bookshelf_http::{AppError, FieldError};

use super::models::{Book, BookChanges, CreateBookRequest, ListParams, MessageResponse, UpdateBookRequest};
use super::store::{parse_id, BookStore, Page};
use super::upload::{CoverStorage, COVER_FIELD};
use super::validation::BookValidator;

pub const NOT_FOUND_MESSAGE: &str = "Book not found";
pub const DELETED_MESSAGE: &str = "Book deleted successfully";
pub const PAGINATION_MESSAGE: &str = "Page and limit must be positive integers.";
pub const COVER_REQUIRED_MESSAGE: &str = "Cover image file is required";

/// Everything a books request needs; cloned per request, holds no
/// per-request state.
#[derive(Clone)]
pub struct BooksState {
    pub store: Arc<dyn BookStore>,
    pub validator: BookValidator,
    pub covers: CoverStorage,
}

fn not_found() -> AppError {
    AppError::not_found(NOT_FOUND_MESSAGE)
}

/// `POST /api/books`
pub async fn create_book(
    State(state): State<BooksState>,
    payload: Result<Json<CreateBookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let Json(request) = payload?;
    let new_book = state
        .validator
        .validate_create(request)
        .map_err(AppError::validation)?;

    let book = state.store.create(new_book).await?;
    tracing::info!(book_id = %book.id, isbn = %book.isbn, "book created");

    Ok((StatusCode::CREATED, Json(book)))
}

/// `GET /api/books?page=&limit=`
pub async fn list_books(
    State(state): State<BooksState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Book>>, AppError> {
    let page = params
        .ok()
        .and_then(|Query(params)| Page::new(params.page, params.limit))
        .ok_or_else(|| AppError::bad_request(PAGINATION_MESSAGE))?;

    let books = state.store.list(page).await?;
    tracing::debug!(skip = page.skip, limit = page.limit, count = books.len(), "books listed");

    Ok(Json(books))
}

/// `GET /api/books/{id}`
pub async fn get_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    let book = state.store.find_by_id(&id).await?.ok_or_else(not_found)?;
    Ok(Json(book))
}

/// `PUT /api/books/{id}`
pub async fn update_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBookRequest>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let Json(request) = payload?;
    let changes = state
        .validator
        .validate_update(request)
        .map_err(AppError::validation)?;

    let book = state
        .store
        .update_by_id(&id, changes)
        .await?
        .ok_or_else(not_found)?;
    tracing::info!(book_id = %book.id, "book updated");

    Ok(Json(book))
}

/// `PATCH /api/books/cover-image/{id}`
pub async fn update_book_cover(
    State(state): State<BooksState>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Book>, AppError> {
    // Reject malformed ids before anything is written to disk.
    parse_id(&id)?;

    let cover = state
        .covers
        .receive(multipart?)
        .await?
        .ok_or_else(|| {
            AppError::validation(vec![FieldError::new(COVER_FIELD, COVER_REQUIRED_MESSAGE)])
        })?;

    // `cover` is discarded on every early return below.
    let previous = state
        .store
        .find_by_id(&id)
        .await?
        .ok_or_else(not_found)?
        .cover_image;

    let book = state
        .store
        .update_by_id(&id, BookChanges::cover_image(cover.path_string()))
        .await?
        .ok_or_else(not_found)?;

    let path = cover.keep();
    tracing::info!(book_id = %book.id, path = %path, "book cover updated");

    if let Some(previous) = previous.filter(|previous| *previous != path) {
        state.covers.discard(&previous).await;
    }

    Ok(Json(book))
}

/// `DELETE /api/books/{id}`
pub async fn delete_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let book = state.store.delete_by_id(&id).await?.ok_or_else(not_found)?;
    tracing::info!(book_id = %book.id, "book deleted");

    if let Some(cover) = book.cover_image.as_deref() {
        state.covers.discard(cover).await;
    }

    Ok(Json(MessageResponse {
        message: DELETED_MESSAGE.to_string(),
    }))
}
