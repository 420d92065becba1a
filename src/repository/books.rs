//! Books repository for database operations

use async_trait::async_trait;

use super::{BookStore, PgUnitOfWork};
use crate::{error::AppResult, models::Book};

#[async_trait]
impl BookStore for PgUnitOfWork {
    async fn find_book(&mut self, id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, publication_year, isbn, available FROM books WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(book)
    }

    async fn compare_and_set_availability(
        &mut self,
        id: i64,
        expected: bool,
        new_value: bool,
    ) -> AppResult<bool> {
        // Concurrent writers queue on the row lock, then re-check the predicate
        let result = sqlx::query("UPDATE books SET available = $3 WHERE id = $1 AND available = $2")
            .bind(id)
            .bind(expected)
            .bind(new_value)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
