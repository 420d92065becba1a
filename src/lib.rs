//! Library lending server
//!
//! Atomic borrow and return of books over a REST JSON API. The lending
//! coordinator keeps each book's availability flag and its open borrowing
//! record consistent under concurrent callers.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub services: std::sync::Arc<services::Services>,
}
