//! Error types for the lending server

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes carried in every error response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    NoSuchPatron = 4,
    NoSuchBook = 5,
    BookNotAvailable = 7,
    BadValue = 18,
    NoSuchBorrowing = 20,
}

/// Entity that a lookup failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Book(i64),
    Patron(i64),
    /// Borrowing record, open or closed
    Borrowing(i64),
    OpenBorrowing { book_id: i64, patron_id: i64 },
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Book(id) => write!(f, "Book not found with ID: {}", id),
            Entity::Patron(id) => write!(f, "Patron not found with ID: {}", id),
            Entity::Borrowing(id) => write!(f, "Borrowing record not found with ID: {}", id),
            Entity::OpenBorrowing { book_id, patron_id } => write!(
                f,
                "No active borrowing record found for book ID: {} and patron ID: {}",
                book_id, patron_id
            ),
        }
    }
}

/// Reason a lending transition was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The book already has an open borrowing record
    Unavailable(i64),
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Unavailable(id) => {
                write!(f, "Book {} is not available for borrowing", id)
            }
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(Entity),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Transient failure: {0}")]
    TransientFailure(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may reasonably retry the same call
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientFailure(_))
    }
}

/// Every storage failure is transient from the coordinator's point of view:
/// timeouts, lock timeouts, serialization and deadlock aborts, lost connections.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", e);
        AppError::TransientFailure(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::NotFound(Entity::Book(_)) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchBook),
            AppError::NotFound(Entity::Patron(_)) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchPatron)
            }
            AppError::NotFound(Entity::Borrowing(_) | Entity::OpenBorrowing { .. }) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchBorrowing)
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::BookNotAvailable),
            AppError::TransientFailure(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::DbFailure)
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure)
            }
        };

        let message = match &self {
            // Store internals stay in the logs
            AppError::TransientFailure(_) => "Temporary storage failure, retry later".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
