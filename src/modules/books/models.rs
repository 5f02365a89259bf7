use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted book as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Store-assigned identifier (24 hex characters)
    pub id: String,
    pub title: String,
    pub author: String,
    pub published_date: DateTime<Utc>,
    /// Unique across all books
    pub isbn: String,
    /// Path or URL of the cover image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated book ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published_date: DateTime<Utc>,
    pub isbn: String,
    pub cover_image: Option<String>,
}

/// Validated field changes; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub isbn: Option<String>,
    pub cover_image: Option<String>,
}

impl BookChanges {
    pub fn cover_image(path: impl Into<String>) -> Self {
        Self {
            cover_image: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the changes to an in-memory copy.
    pub fn apply_to(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(published_date) = self.published_date {
            book.published_date = published_date;
        }
        if let Some(isbn) = self.isbn {
            book.isbn = isbn;
        }
        if let Some(cover_image) = self.cover_image {
            book.cover_image = Some(cover_image);
        }
    }
}

/// Body of `POST /api/books`.
///
/// Every field is optional here so missing fields can be reported
/// individually by the validator instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub isbn: Option<String>,
    pub cover_image: Option<String>,
}

/// Body of `PUT /api/books/{id}`; any subset of fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub isbn: Option<String>,
    pub cover_image: Option<String>,
}

/// Query string of `GET /api/books`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    #[serde(default = "ListParams::default_page")]
    pub page: i64,
    #[serde(default = "ListParams::default_limit")]
    pub limit: i64,
}

impl ListParams {
    fn default_page() -> i64 {
        1
    }

    fn default_limit() -> i64 {
        10
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            limit: Self::default_limit(),
        }
    }
}

/// Body of the delete confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Book {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Book {
            id: "65a000000000000000000001".to_string(),
            title: "Test Book".to_string(),
            author: "Test Author".to_string(),
            published_date: at,
            isbn: "1234567890123".to_string(),
            cover_image: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn book_serializes_with_camel_case_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["publishedDate"], "2024-01-01T00:00:00Z");
        assert_eq!(value["isbn"], "1234567890123");
        assert!(value.get("coverImage").is_none());
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn changes_only_touch_supplied_fields() {
        let mut book = sample();
        BookChanges {
            title: Some("Updated Book Title".to_string()),
            ..BookChanges::default()
        }
        .apply_to(&mut book);

        assert_eq!(book.title, "Updated Book Title");
        assert_eq!(book.author, "Test Author");
        assert_eq!(book.isbn, "1234567890123");
    }

    #[test]
    fn list_params_default_to_first_page_of_ten() {
        let params: ListParams = serde_json::from_str("{}").unwrap();
        assert_eq!((params.page, params.limit), (1, 10));
    }
}
