//! Book model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Book record from database.
///
/// `available` is owned by the lending coordinator: it is true exactly when
/// no open borrowing record references the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub publication_year: i32,
    pub isbn: String,
    pub available: bool,
}
