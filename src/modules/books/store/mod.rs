//! Persistence for books.
//!
//! Handlers talk to an `Arc<dyn BookStore>`; `MongoBookStore` backs
//! production and `MemoryBookStore` backs `memory://` and the tests.

mod memory;
mod mongo;

pub use memory::MemoryBookStore;
pub use mongo::{MongoBookStore, COLLECTION};

use async_trait::async_trait;
use bookshelf_http::AppError;
use bson::oid::ObjectId;
use thiserror::Error;

use super::models::{Book, BookChanges, NewBook};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid book id '{0}'")]
    InvalidId(String),

    /// A unique index rejected the write; carries the store's message.
    #[error("{0}")]
    DuplicateKey(String),

    #[error(transparent)]
    Database(mongodb::error::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(_) => AppError::bad_request("Invalid book id"),
            other => AppError::internal(other),
        }
    }
}

/// Parse a book id, rejecting anything that is not a 24-hex-digit ObjectId.
pub fn parse_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// A window over the store's natural order (creation time, then id).
///
/// Both fields fit in an `i64`, which is how MongoDB receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    /// Window for 1-based `page` of `limit` books; `None` unless both are
    /// positive.
    pub fn new(page: i64, limit: i64) -> Option<Self> {
        if page < 1 || limit < 1 {
            return None;
        }

        Some(Self {
            skip: (page - 1).saturating_mul(limit) as u64,
            limit: limit as u64,
        })
    }
}

#[async_trait]
pub trait BookStore: Send + Sync {
    /// Insert a book and return it with its id and timestamps.
    async fn create(&self, book: NewBook) -> Result<Book, StoreError>;

    async fn list(&self, page: Page) -> Result<Vec<Book>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Book>, StoreError>;

    /// Apply `changes` and return the book as it is after the update.
    async fn update_by_id(&self, id: &str, changes: BookChanges)
        -> Result<Option<Book>, StoreError>;

    /// Remove a book, returning what was removed.
    async fn delete_by_id(&self, id: &str) -> Result<Option<Book>, StoreError>;
}

/// Current time at the millisecond precision documents are stored with.
pub(crate) fn now() -> chrono::DateTime<chrono::Utc> {
    bson::DateTime::now().to_chrono()
}

/// Truncate to stored precision so a created book equals its re-read copy.
pub(crate) fn stored_precision(at: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    bson::DateTime::from_chrono(at).to_chrono()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn page_computes_skip() {
        assert_eq!(Page::new(1, 10), Some(Page { skip: 0, limit: 10 }));
        assert_eq!(Page::new(3, 5), Some(Page { skip: 10, limit: 5 }));
    }

    #[test]
    fn page_rejects_non_positive_values() {
        assert_eq!(Page::new(0, 10), None);
        assert_eq!(Page::new(1, 0), None);
        assert_eq!(Page::new(-2, 10), None);
        assert_eq!(Page::new(1, -1), None);
    }

    #[test]
    fn page_skip_saturates() {
        let page = Page::new(i64::MAX, i64::MAX).unwrap();
        assert_eq!(page.skip, i64::MAX as u64);

        let page = Page::new(i64::MAX, 10).unwrap();
        assert_eq!(page.skip, i64::MAX as u64);
        assert!(i64::try_from(page.skip).is_ok());
    }

    #[test]
    fn parse_id_accepts_object_ids_only() {
        let id = ObjectId::new().to_hex();
        assert!(parse_id(&id).is_ok());
        assert!(matches!(parse_id("42"), Err(StoreError::InvalidId(raw)) if raw == "42"));
    }

    #[test]
    fn store_errors_map_to_http_statuses() {
        let invalid: AppError = StoreError::InvalidId("x".to_string()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let duplicate: AppError = StoreError::DuplicateKey("dup".to_string()).into();
        assert_eq!(duplicate.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(duplicate.to_string(), "dup");
    }
}
