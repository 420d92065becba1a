//! Patron model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Patron {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}
