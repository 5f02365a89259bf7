use async_trait::async_trait;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, ReturnDocument};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use super::{now, parse_id, stored_precision, BookStore, Page, StoreError};
use crate::modules::books::models::{Book, BookChanges, NewBook};

/// Collection holding book documents.
pub const COLLECTION: &str = "books";

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Book as stored in MongoDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    title: String,
    author: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    published_date: DateTime<Utc>,
    isbn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cover_image: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
}

impl From<BookDocument> for Book {
    fn from(document: BookDocument) -> Self {
        Self {
            id: document.id.to_hex(),
            title: document.title,
            author: document.author,
            published_date: document.published_date,
            isbn: document.isbn,
            cover_image: document.cover_image,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// `$set` document for an update; `updatedAt` is always refreshed.
fn set_document(changes: BookChanges) -> Document {
    let mut set = doc! { "updatedAt": bson::DateTime::now() };

    if let Some(title) = changes.title {
        set.insert("title", title);
    }
    if let Some(author) = changes.author {
        set.insert("author", author);
    }
    if let Some(published_date) = changes.published_date {
        set.insert("publishedDate", bson::DateTime::from_chrono(published_date));
    }
    if let Some(isbn) = changes.isbn {
        set.insert("isbn", isbn);
    }
    if let Some(cover_image) = changes.cover_image {
        set.insert("coverImage", cover_image);
    }

    set
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

/// Sorted window for `list`.
fn list_options(page: Page) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "createdAt": 1, "_id": 1 })
        .skip(page.skip)
        .limit(i64::try_from(page.limit).unwrap_or(i64::MAX))
        .build()
}

impl From<MongoError> for StoreError {
    fn from(err: MongoError) -> Self {
        if is_duplicate_key(&err) {
            StoreError::DuplicateKey(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

/// [`BookStore`] over the `books` collection.
#[derive(Clone)]
pub struct MongoBookStore {
    collection: Collection<BookDocument>,
}

impl MongoBookStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(COLLECTION),
        }
    }
}

#[async_trait]
impl BookStore for MongoBookStore {
    async fn create(&self, book: NewBook) -> Result<Book, StoreError> {
        let created_at = now();
        let document = BookDocument {
            id: ObjectId::new(),
            title: book.title,
            author: book.author,
            published_date: stored_precision(book.published_date),
            isbn: book.isbn,
            cover_image: book.cover_image,
            created_at,
            updated_at: created_at,
        };

        self.collection.insert_one(&document).await?;
        Ok(document.into())
    }

    async fn list(&self, page: Page) -> Result<Vec<Book>, StoreError> {
        let documents: Vec<BookDocument> = self
            .collection
            .find(doc! {})
            .with_options(list_options(page))
            .await?
            .try_collect()
            .await?;

        Ok(documents.into_iter().map(Book::from).collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let id = parse_id(id)?;
        let document = self.collection.find_one(doc! { "_id": id }).await?;
        Ok(document.map(Book::from))
    }

    async fn update_by_id(
        &self,
        id: &str,
        changes: BookChanges,
    ) -> Result<Option<Book>, StoreError> {
        let id = parse_id(id)?;
        let document = self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set_document(changes) })
            .return_document(ReturnDocument::After)
            .await?;
        Ok(document.map(Book::from))
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let id = parse_id(id)?;
        let document = self.collection.find_one_and_delete(doc! { "_id": id }).await?;
        Ok(document.map(Book::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn set_document_only_contains_supplied_fields() {
        let set = set_document(BookChanges {
            title: Some("Updated Book Title".to_string()),
            ..BookChanges::default()
        });

        let keys: Vec<&str> = set.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["updatedAt", "title"]);
        assert_eq!(set.get_str("title").unwrap(), "Updated Book Title");
    }

    #[test]
    fn set_document_stores_dates_as_bson_dates() {
        let published = Utc.with_ymd_and_hms(1999, 12, 31, 0, 0, 0).unwrap();
        let set = set_document(BookChanges {
            published_date: Some(published),
            cover_image: Some("uploads/1-cover.png".to_string()),
            ..BookChanges::default()
        });

        assert_eq!(
            set.get_datetime("publishedDate").unwrap().to_chrono(),
            published
        );
        assert_eq!(set.get_str("coverImage").unwrap(), "uploads/1-cover.png");
    }

    #[test]
    fn list_options_serialize_for_far_pages() {
        let page = Page::new(i64::MAX, 10).unwrap();
        let options = bson::to_document(&list_options(page)).unwrap();

        assert_eq!(options.get_i64("skip").unwrap(), i64::MAX);
        assert_eq!(options.get_i64("limit").unwrap(), 10);
    }

    #[test]
    fn document_round_trips_through_bson() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let document = BookDocument {
            id: ObjectId::new(),
            title: "Test Book".to_string(),
            author: "Test Author".to_string(),
            published_date: at,
            isbn: "1234567890123".to_string(),
            cover_image: None,
            created_at: at,
            updated_at: at,
        };

        let raw = bson::to_document(&document).unwrap();
        assert!(raw.get_object_id("_id").is_ok());
        assert!(raw.get_datetime("publishedDate").is_ok());
        assert!(!raw.contains_key("coverImage"));

        let book = Book::from(bson::from_document::<BookDocument>(raw).unwrap());
        assert_eq!(book.id, document.id.to_hex());
        assert_eq!(book.published_date, at);
    }
}
