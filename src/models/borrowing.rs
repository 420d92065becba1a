//! Borrowing record model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::{book::Book, patron::Patron};

/// Borrowing record from database. Never deleted: closed records are the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BorrowingRecord {
    pub id: i64,
    pub book_id: i64,
    pub patron_id: i64,
    pub borrow_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
}

impl BorrowingRecord {
    /// A record is open while the book has not been returned
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Outcome of a borrow or return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowingResult {
    /// Borrowing record ID
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub patron_id: i64,
    pub patron_name: String,
    pub borrow_date: NaiveDate,
    /// Set once the book has been returned
    pub return_date: Option<NaiveDate>,
}

impl BorrowingResult {
    pub fn new(record: &BorrowingRecord, book: &Book, patron: &Patron) -> Self {
        Self {
            id: record.id,
            book_id: book.id,
            book_title: book.title.clone(),
            patron_id: patron.id,
            patron_name: patron.name.clone(),
            borrow_date: record.borrow_date,
            return_date: record.return_date,
        }
    }
}

/// Borrow request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BorrowRequest {
    /// Book ID
    #[validate(range(min = 1, message = "Book ID is required"))]
    pub book_id: i64,
    /// Patron ID
    #[validate(range(min = 1, message = "Patron ID is required"))]
    pub patron_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrow_request_rejects_non_positive_ids() {
        let request = BorrowRequest { book_id: 0, patron_id: 7 };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("book_id"));

        assert!(BorrowRequest { book_id: 1, patron_id: 7 }.validate().is_ok());
    }

    #[test]
    fn test_result_carries_display_fields() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let record = BorrowingRecord {
            id: 11,
            book_id: 1,
            patron_id: 7,
            borrow_date: date,
            return_date: None,
        };
        let book = Book {
            id: 1,
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            publication_year: 1965,
            isbn: "9780441013593".into(),
            available: false,
        };
        let patron = Patron {
            id: 7,
            name: "Ada".into(),
            email: "ada@example.org".into(),
            phone: None,
        };

        let result = BorrowingResult::new(&record, &book, &patron);
        assert_eq!(result.book_title, "Dune");
        assert_eq!(result.patron_name, "Ada");
        assert_eq!(result.borrow_date, date);
        assert!(result.return_date.is_none());
        assert!(record.is_open());
    }
}
