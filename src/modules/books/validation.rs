//! Request validation for the books module.
//!
//! Raw request bodies are turned into [`NewBook`] / [`BookChanges`] here, so
//! handlers and stores only ever see checked values.

use bookshelf_http::FieldError;
use bookshelf_kernel::settings::IsbnRule;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::models::{BookChanges, CreateBookRequest, NewBook, UpdateBookRequest};

const TITLE_REQUIRED: &str = "Title is required";
const AUTHOR_REQUIRED: &str = "Author is required";
const TITLE_EMPTY: &str = "Title must not be empty";
const AUTHOR_EMPTY: &str = "Author must not be empty";
const DATE_INVALID: &str = "Published Date must be a valid date";
const ISBN_LENGTH: &str = "ISBN must be between 10 and 13 characters long";
const ISBN_SYNTAX: &str = "ISBN must be a valid ISBN-10 or ISBN-13";

pub const ISBN_MIN_LEN: usize = 10;
pub const ISBN_MAX_LEN: usize = 13;

#[derive(Debug, Clone, Copy, Default)]
pub struct BookValidator {
    isbn_rule: IsbnRule,
}

impl BookValidator {
    pub fn new(isbn_rule: IsbnRule) -> Self {
        Self { isbn_rule }
    }

    /// Check a create request; every field but `coverImage` is required.
    pub fn validate_create(&self, request: CreateBookRequest) -> Result<NewBook, Vec<FieldError>> {
        let mut errors = Vec::new();

        let title = required_text(request.title, "title", TITLE_REQUIRED, &mut errors);
        let author = required_text(request.author, "author", AUTHOR_REQUIRED, &mut errors);

        let published_date = match request.published_date.as_deref().and_then(parse_published_date) {
            Some(date) => Some(date),
            None => {
                errors.push(FieldError::new("publishedDate", DATE_INVALID));
                None
            }
        };

        let isbn = request.isbn.unwrap_or_default();
        if let Some(message) = self.isbn_problem(&isbn) {
            errors.push(FieldError::new("isbn", message));
        }

        match (title, author, published_date) {
            (Some(title), Some(author), Some(published_date)) if errors.is_empty() => Ok(NewBook {
                title,
                author,
                published_date,
                isbn,
                cover_image: request.cover_image,
            }),
            _ => Err(errors),
        }
    }

    /// Check the fields present in an update request.
    pub fn validate_update(&self, request: UpdateBookRequest) -> Result<BookChanges, Vec<FieldError>> {
        let mut errors = Vec::new();

        if request.title.as_deref().is_some_and(is_blank) {
            errors.push(FieldError::new("title", TITLE_EMPTY));
        }
        if request.author.as_deref().is_some_and(is_blank) {
            errors.push(FieldError::new("author", AUTHOR_EMPTY));
        }

        let published_date = match request.published_date.as_deref() {
            Some(raw) => {
                let parsed = parse_published_date(raw);
                if parsed.is_none() {
                    errors.push(FieldError::new("publishedDate", DATE_INVALID));
                }
                parsed
            }
            None => None,
        };

        if let Some(message) = request.isbn.as_deref().and_then(|isbn| self.isbn_problem(isbn)) {
            errors.push(FieldError::new("isbn", message));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(BookChanges {
            title: request.title,
            author: request.author,
            published_date,
            isbn: request.isbn,
            cover_image: request.cover_image,
        })
    }

    fn isbn_problem(&self, isbn: &str) -> Option<&'static str> {
        match self.isbn_rule {
            IsbnRule::Length => {
                let len = isbn.chars().count();
                (is_blank(isbn) || !(ISBN_MIN_LEN..=ISBN_MAX_LEN).contains(&len)).then_some(ISBN_LENGTH)
            }
            IsbnRule::Isbn => (!is_valid_isbn(isbn)).then_some(ISBN_SYNTAX),
        }
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn required_text(
    value: Option<String>,
    field: &str,
    message: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Some(text) if !is_blank(&text) => Some(text),
        _ => {
            errors.push(FieldError::new(field, message));
            None
        }
    }
}

/// Parse an ISO-8601 date or date-time.
///
/// Date-only values and date-times without an offset are taken as UTC.
pub fn parse_published_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(date_time) = DateTime::parse_from_rfc3339(raw) {
        return Some(date_time.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// ISBN-10 or ISBN-13 with a correct check digit; hyphens and spaces ignored.
pub fn is_valid_isbn(raw: &str) -> bool {
    let compact: Vec<char> = raw.chars().filter(|c| *c != '-' && *c != ' ').collect();

    match compact.len() {
        10 => {
            let mut sum = 0;
            for (index, c) in compact.iter().enumerate() {
                let value = match (index, c) {
                    (9, 'X' | 'x') => 10,
                    (_, c) => match c.to_digit(10) {
                        Some(digit) => digit,
                        None => return false,
                    },
                };
                sum += value * (10 - index as u32);
            }
            sum % 11 == 0
        }
        13 => {
            let mut sum = 0;
            for (index, c) in compact.iter().enumerate() {
                let Some(digit) = c.to_digit(10) else {
                    return false;
                };
                sum += if index % 2 == 0 { digit } else { digit * 3 };
            }
            sum % 10 == 0
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid_request() -> CreateBookRequest {
        CreateBookRequest {
            title: Some("Test Book".to_string()),
            author: Some("Test Author".to_string()),
            published_date: Some("2024-01-01".to_string()),
            isbn: Some("1234567890123".to_string()),
            cover_image: None,
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn accepts_a_complete_request() {
        let book = BookValidator::default().validate_create(valid_request()).unwrap();
        assert_eq!(book.title, "Test Book");
        assert_eq!(
            book.published_date,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn reports_every_missing_field() {
        let errors = BookValidator::default()
            .validate_create(CreateBookRequest::default())
            .unwrap_err();

        assert_eq!(fields(&errors), vec!["title", "author", "publishedDate", "isbn"]);
        assert_eq!(errors[0].message, TITLE_REQUIRED);
        assert_eq!(errors[3].message, ISBN_LENGTH);
    }

    #[test]
    fn blank_strings_count_as_missing() {
        let request = CreateBookRequest {
            title: Some("   ".to_string()),
            author: Some(String::new()),
            ..valid_request()
        };
        let errors = BookValidator::default().validate_create(request).unwrap_err();
        assert_eq!(fields(&errors), vec!["title", "author"]);
    }

    #[test]
    fn isbn_length_bounds_are_inclusive() {
        let validator = BookValidator::default();
        for (isbn, ok) in [
            ("123456789", false),
            ("1234567890", true),
            ("1234567890123", true),
            ("12345678901234", false),
        ] {
            let request = CreateBookRequest {
                isbn: Some(isbn.to_string()),
                ..valid_request()
            };
            assert_eq!(validator.validate_create(request).is_ok(), ok, "isbn {isbn}");
        }
    }

    #[test]
    fn isbn_rule_checks_checksum() {
        let validator = BookValidator::new(IsbnRule::Isbn);
        let request = CreateBookRequest {
            isbn: Some("978-0-306-40615-7".to_string()),
            ..valid_request()
        };
        assert!(validator.validate_create(request).is_ok());

        let errors = validator.validate_create(valid_request()).unwrap_err();
        assert_eq!(errors, vec![FieldError::new("isbn", ISBN_SYNTAX)]);
    }

    #[test]
    fn recognises_isbn_10_and_13() {
        assert!(is_valid_isbn("0306406152"));
        assert!(is_valid_isbn("0-8044-2957-X"));
        assert!(is_valid_isbn("9780306406157"));
        assert!(!is_valid_isbn("9780306406158"));
        assert!(!is_valid_isbn("030640615"));
        assert!(!is_valid_isbn("X306406152"));
    }

    #[test]
    fn parses_iso_8601_forms() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_published_date("2024-01-01"), Some(midnight));
        assert_eq!(parse_published_date("2024-01-01T00:00:00Z"), Some(midnight));
        assert_eq!(parse_published_date("2024-01-01T02:00:00+02:00"), Some(midnight));
        assert_eq!(parse_published_date("2024-01-01T00:00:00.000"), Some(midnight));
        assert_eq!(parse_published_date("01/01/2024"), None);
        assert_eq!(parse_published_date("2024-02-30"), None);
    }

    #[test]
    fn update_accepts_partial_bodies() {
        let changes = BookValidator::default()
            .validate_update(UpdateBookRequest {
                title: Some("Updated Book Title".to_string()),
                ..UpdateBookRequest::default()
            })
            .unwrap();

        assert_eq!(changes.title.as_deref(), Some("Updated Book Title"));
        assert!(changes.author.is_none());
        assert!(changes.isbn.is_none());
    }

    #[test]
    fn update_rejects_bad_supplied_fields() {
        let errors = BookValidator::default()
            .validate_update(UpdateBookRequest {
                title: Some(String::new()),
                published_date: Some("yesterday".to_string()),
                isbn: Some("123".to_string()),
                ..UpdateBookRequest::default()
            })
            .unwrap_err();

        assert_eq!(fields(&errors), vec!["title", "publishedDate", "isbn"]);
    }
}
