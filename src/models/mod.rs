//! Data models for the lending server

pub mod book;
pub mod borrowing;
pub mod patron;

// Re-export commonly used types
pub use book::Book;
pub use borrowing::{BorrowRequest, BorrowingRecord, BorrowingResult};
pub use patron::Patron;
