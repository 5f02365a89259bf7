use async_trait::async_trait;
use bson::oid::ObjectId;
use tokio::sync::RwLock;

use super::{now, parse_id, stored_precision, BookStore, Page, StoreError};
use crate::modules::books::models::{Book, BookChanges, NewBook};

/// In-process [`BookStore`], kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryBookStore {
    books: RwLock<Vec<Book>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.books.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.books.read().await.is_empty()
    }
}

fn duplicate_isbn(isbn: &str) -> StoreError {
    StoreError::DuplicateKey(format!(
        "duplicate key error: index isbn_1 dup key: {{ isbn: \"{}\" }}",
        isbn
    ))
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn create(&self, book: NewBook) -> Result<Book, StoreError> {
        let mut books = self.books.write().await;
        if books.iter().any(|existing| existing.isbn == book.isbn) {
            return Err(duplicate_isbn(&book.isbn));
        }

        let created_at = now();
        let book = Book {
            id: ObjectId::new().to_hex(),
            title: book.title,
            author: book.author,
            published_date: stored_precision(book.published_date),
            isbn: book.isbn,
            cover_image: book.cover_image,
            created_at,
            updated_at: created_at,
        };
        books.push(book.clone());

        Ok(book)
    }

    async fn list(&self, page: Page) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read().await;
        let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);

        Ok(books.iter().skip(skip).take(limit).cloned().collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let id = parse_id(id)?.to_hex();
        let books = self.books.read().await;
        Ok(books.iter().find(|book| book.id == id).cloned())
    }

    async fn update_by_id(
        &self,
        id: &str,
        mut changes: BookChanges,
    ) -> Result<Option<Book>, StoreError> {
        let id = parse_id(id)?.to_hex();
        let mut books = self.books.write().await;

        if let Some(isbn) = changes.isbn.as_deref() {
            if books.iter().any(|other| other.id != id && other.isbn == isbn) {
                return Err(duplicate_isbn(isbn));
            }
        }

        let Some(book) = books.iter_mut().find(|book| book.id == id) else {
            return Ok(None);
        };

        changes.published_date = changes.published_date.map(stored_precision);
        changes.apply_to(book);
        book.updated_at = now();

        Ok(Some(book.clone()))
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let id = parse_id(id)?.to_hex();
        let mut books = self.books.write().await;

        Ok(books
            .iter()
            .position(|book| book.id == id)
            .map(|index| books.remove(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn new_book(isbn: &str) -> NewBook {
        NewBook {
            title: "Test Book".to_string(),
            author: "Test Author".to_string(),
            published_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            isbn: isbn.to_string(),
            cover_image: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamps() {
        let store = MemoryBookStore::new();
        let book = store.create(new_book("1234567890123")).await.unwrap();

        assert!(parse_id(&book.id).is_ok());
        assert_eq!(book.created_at, book.updated_at);
        assert_eq!(store.find_by_id(&book.id).await.unwrap(), Some(book));
    }

    #[tokio::test]
    async fn duplicate_isbn_is_rejected_without_inserting() {
        let store = MemoryBookStore::new();
        store.create(new_book("1234567890123")).await.unwrap();

        let err = store.create(new_book("1234567890123")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_into_existing_isbn_fails() {
        let store = MemoryBookStore::new();
        store.create(new_book("1111111111")).await.unwrap();
        let second = store.create(new_book("2222222222")).await.unwrap();

        let err = store
            .update_by_id(
                &second.id,
                BookChanges {
                    isbn: Some("1111111111".to_string()),
                    ..BookChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        // Re-submitting a book's own isbn is not a conflict.
        let same = store
            .update_by_id(
                &second.id,
                BookChanges {
                    isbn: Some("2222222222".to_string()),
                    ..BookChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(same.is_some());
    }

    #[tokio::test]
    async fn pages_do_not_overlap() {
        let store = MemoryBookStore::new();
        for n in 0..5 {
            store.create(new_book(&format!("978000000000{n}"))).await.unwrap();
        }

        let first = store.list(Page::new(1, 2).unwrap()).await.unwrap();
        let second = store.list(Page::new(2, 2).unwrap()).await.unwrap();
        let third = store.list(Page::new(3, 2).unwrap()).await.unwrap();
        let beyond = store.list(Page::new(4, 2).unwrap()).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert!(beyond.is_empty());
        assert!(!first.iter().any(|book| book.id == second[0].id));
        assert_eq!(first[0].isbn, "9780000000000");
        assert_eq!(third[0].isbn, "9780000000004");
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let store = MemoryBookStore::new();
        let missing = ObjectId::new().to_hex();

        assert_eq!(store.find_by_id(&missing).await.unwrap(), None);
        assert_eq!(store.delete_by_id(&missing).await.unwrap(), None);
        assert!(store
            .update_by_id(&missing, BookChanges::default())
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            store.find_by_id("not-an-id").await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = MemoryBookStore::new();
        let book = store.create(new_book("1234567890")).await.unwrap();

        let removed = store.delete_by_id(&book.id).await.unwrap();
        assert_eq!(removed.map(|b| b.id), Some(book.id.clone()));
        assert!(store.is_empty().await);
        assert_eq!(store.find_by_id(&book.id).await.unwrap(), None);
    }
}
