//! Repository layer: store contracts, the Postgres unit of work, and an in-memory backend

pub mod books;
pub mod borrowings;
pub mod memory;
pub mod patrons;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::AppResult,
    models::{Book, BorrowingRecord, Patron},
};

/// Book reads and the availability flag
#[async_trait]
pub trait BookStore: Send {
    async fn find_book(&mut self, id: i64) -> AppResult<Option<Book>>;

    /// Set `available = new_value` only if it currently equals `expected`.
    /// Returns true iff the row matched and was updated. The row stays locked
    /// until the unit of work ends.
    async fn compare_and_set_availability(
        &mut self,
        id: i64,
        expected: bool,
        new_value: bool,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait PatronStore: Send {
    async fn find_patron(&mut self, id: i64) -> AppResult<Option<Patron>>;
}

/// Borrowing records: created open, closed once, never deleted
#[async_trait]
pub trait BorrowingLedger: Send {
    async fn create_open(
        &mut self,
        book_id: i64,
        patron_id: i64,
        borrow_date: NaiveDate,
    ) -> AppResult<BorrowingRecord>;

    async fn find_open_by_book_and_patron(
        &mut self,
        book_id: i64,
        patron_id: i64,
    ) -> AppResult<Option<BorrowingRecord>>;

    /// Close an open record. Fails with `NotFound(OpenBorrowing)` if the record
    /// is no longer open, e.g. a concurrent return committed first.
    async fn close(&mut self, record_id: i64, return_date: NaiveDate) -> AppResult<BorrowingRecord>;
}

/// One transaction spanning all three stores.
///
/// Nothing written through it is visible to other units of work before
/// `commit`. Dropping it without committing rolls everything back.
#[async_trait]
pub trait UnitOfWork: BookStore + PatronStore + BorrowingLedger {
    async fn commit(self: Box<Self>) -> AppResult<()>;
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Source of units of work
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}

/// Postgres-backed repository holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for Repository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A Postgres transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
