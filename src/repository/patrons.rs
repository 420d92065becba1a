//! Patrons repository for database operations

use async_trait::async_trait;

use super::{PatronStore, PgUnitOfWork};
use crate::{error::AppResult, models::Patron};

#[async_trait]
impl PatronStore for PgUnitOfWork {
    async fn find_patron(&mut self, id: i64) -> AppResult<Option<Patron>> {
        let patron = sqlx::query_as::<_, Patron>(
            "SELECT id, name, email, phone FROM patrons WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(patron)
    }
}
