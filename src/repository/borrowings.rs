//! Borrowings repository for database operations

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{BorrowingLedger, PgUnitOfWork};
use crate::{
    error::{AppError, AppResult, ConflictKind, Entity},
    models::BorrowingRecord,
};

/// Partial unique index: one open record per book
const ONE_OPEN_PER_BOOK: &str = "borrowings_one_open_per_book";
const BOOK_FK: &str = "borrowings_book_id_fkey";
const PATRON_FK: &str = "borrowings_patron_id_fkey";

/// Translate constraint violations on insert into lending errors
fn insert_error(e: sqlx::Error, book_id: i64, patron_id: i64) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        match db.constraint() {
            Some(ONE_OPEN_PER_BOOK) => return AppError::Conflict(ConflictKind::Unavailable(book_id)),
            Some(BOOK_FK) => return AppError::NotFound(Entity::Book(book_id)),
            Some(PATRON_FK) => return AppError::NotFound(Entity::Patron(patron_id)),
            _ => {}
        }
    }
    e.into()
}

#[async_trait]
impl BorrowingLedger for PgUnitOfWork {
    async fn create_open(
        &mut self,
        book_id: i64,
        patron_id: i64,
        borrow_date: NaiveDate,
    ) -> AppResult<BorrowingRecord> {
        sqlx::query_as::<_, BorrowingRecord>(
            r#"
            INSERT INTO borrowings (book_id, patron_id, borrow_date, return_date)
            VALUES ($1, $2, $3, NULL)
            RETURNING id, book_id, patron_id, borrow_date, return_date
            "#,
        )
        .bind(book_id)
        .bind(patron_id)
        .bind(borrow_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| insert_error(e, book_id, patron_id))
    }

    async fn find_open_by_book_and_patron(
        &mut self,
        book_id: i64,
        patron_id: i64,
    ) -> AppResult<Option<BorrowingRecord>> {
        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            SELECT id, book_id, patron_id, borrow_date, return_date
            FROM borrowings
            WHERE book_id = $1 AND patron_id = $2 AND return_date IS NULL
            "#,
        )
        .bind(book_id)
        .bind(patron_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn close(&mut self, record_id: i64, return_date: NaiveDate) -> AppResult<BorrowingRecord> {
        let closed = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            UPDATE borrowings SET return_date = $2
            WHERE id = $1 AND return_date IS NULL
            RETURNING id, book_id, patron_id, borrow_date, return_date
            "#,
        )
        .bind(record_id)
        .bind(return_date)
        .fetch_optional(&mut *self.tx)
        .await?;

        match closed {
            Some(record) => Ok(record),
            None => {
                // Lost the race, or the id never named an open record
                let pair: Option<(i64, i64)> =
                    sqlx::query_as("SELECT book_id, patron_id FROM borrowings WHERE id = $1")
                        .bind(record_id)
                        .fetch_optional(&mut *self.tx)
                        .await?;
                Err(AppError::NotFound(match pair {
                    Some((book_id, patron_id)) => Entity::OpenBorrowing { book_id, patron_id },
                    None => Entity::Borrowing(record_id),
                }))
            }
        }
    }
}
