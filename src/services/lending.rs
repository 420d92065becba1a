//! Lending coordinator: atomic borrow and return.
//!
//! Each call opens one unit of work, runs every store call through it, and
//! either commits or rolls back. Availability is flipped with a conditional
//! update so concurrent borrows of one book produce exactly one winner.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{NaiveDate, Utc};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult, ConflictKind, Entity},
    models::BorrowingResult,
    repository::{Database, UnitOfWork},
};

/// Source of "today" for borrow and return dates
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct LendingCoordinator {
    db: Arc<dyn Database>,
    timeout: Duration,
    clock: Clock,
}

impl LendingCoordinator {
    pub fn new(db: Arc<dyn Database>, config: &LendingConfig) -> Self {
        Self {
            db,
            timeout: config.operation_timeout(),
            clock: Arc::new(|| Utc::now().date_naive()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Borrow a book for a patron
    #[tracing::instrument(skip(self))]
    pub async fn borrow(&self, book_id: i64, patron_id: i64) -> AppResult<BorrowingResult> {
        let today = (self.clock)();
        let result = match self
            .bounded("borrow", async {
                let mut uow = self.db.begin().await?;
                let outcome = Self::borrow_in(uow.as_mut(), book_id, patron_id, today).await;
                Ok((uow, outcome))
            })
            .await
        {
            Ok((uow, outcome)) => Self::finish("borrow", uow, outcome).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(r) => tracing::info!(record_id = r.id, "Book {} borrowed by patron {}", book_id, patron_id),
            Err(e) => tracing::warn!("Borrow of book {} by patron {} rejected: {}", book_id, patron_id, e),
        }
        result
    }

    /// Return a book. Only the patron holding the open record may return it.
    #[tracing::instrument(skip(self))]
    pub async fn return_book(&self, book_id: i64, patron_id: i64) -> AppResult<BorrowingResult> {
        let today = (self.clock)();
        let result = match self
            .bounded("return", async {
                let mut uow = self.db.begin().await?;
                let outcome = Self::return_in(uow.as_mut(), book_id, patron_id, today).await;
                Ok((uow, outcome))
            })
            .await
        {
            Ok((uow, outcome)) => Self::finish("return", uow, outcome).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(r) => tracing::info!(record_id = r.id, "Book {} returned by patron {}", book_id, patron_id),
            Err(e) => tracing::warn!("Return of book {} by patron {} rejected: {}", book_id, patron_id, e),
        }
        result
    }

    /// Check that a unit of work can be opened, without writing anything
    pub async fn check_ready(&self) -> AppResult<()> {
        self.bounded("readiness", async {
            let uow = self.db.begin().await?;
            uow.rollback().await
        })
        .await
    }

    async fn borrow_in(
        uow: &mut dyn UnitOfWork,
        book_id: i64,
        patron_id: i64,
        today: NaiveDate,
    ) -> AppResult<BorrowingResult> {
        let mut book = uow
            .find_book(book_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Book(book_id)))?;

        if !book.available {
            return Err(AppError::Conflict(ConflictKind::Unavailable(book_id)));
        }

        let patron = uow
            .find_patron(patron_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Patron(patron_id)))?;

        // The read above may be stale; this is the real check
        if !uow.compare_and_set_availability(book_id, true, false).await? {
            return Err(AppError::Conflict(ConflictKind::Unavailable(book_id)));
        }
        book.available = false;

        let record = uow.create_open(book_id, patron_id, today).await?;

        Ok(BorrowingResult::new(&record, &book, &patron))
    }

    async fn return_in(
        uow: &mut dyn UnitOfWork,
        book_id: i64,
        patron_id: i64,
        today: NaiveDate,
    ) -> AppResult<BorrowingResult> {
        let open = uow
            .find_open_by_book_and_patron(book_id, patron_id)
            .await?
            .ok_or(AppError::NotFound(Entity::OpenBorrowing { book_id, patron_id }))?;

        let record = uow.close(open.id, today).await?;

        if !uow.compare_and_set_availability(book_id, false, true).await? {
            return Err(AppError::Internal(format!(
                "book {} was available while borrowing record {} was open",
                book_id, record.id
            )));
        }

        let book = uow
            .find_book(book_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Book(book_id)))?;
        let patron = uow
            .find_patron(patron_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Patron(patron_id)))?;

        Ok(BorrowingResult::new(&record, &book, &patron))
    }

    /// Commit on success, roll back on error. Runs outside the operation
    /// timeout: once a commit is sent its outcome must be reported as is,
    /// and the store bounds it on its own (`statement_timeout`).
    async fn finish<T>(
        name: &'static str,
        uow: Box<dyn UnitOfWork>,
        outcome: AppResult<T>,
    ) -> AppResult<T> {
        match outcome {
            Ok(value) => {
                uow.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = uow.rollback().await {
                    tracing::error!("Rollback of {} failed: {}", name, rollback);
                }
                Err(e)
            }
        }
    }

    /// Bound an operation from begin through its last store call. On expiry
    /// the in-flight future is dropped, and with it the uncommitted unit of work.
    async fn bounded<T>(
        &self,
        name: &'static str,
        work: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| {
                AppError::TransientFailure(format!(
                    "{} timed out after {} ms",
                    name,
                    self.timeout.as_millis()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Book, BorrowingRecord, Patron},
        repository::{
            memory::{Fault, MemoryDatabase},
            BookStore, BorrowingLedger, PatronStore,
        },
    };
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    /// Applies the commit, then stalls before acknowledging it
    struct SlowCommit {
        inner: MemoryDatabase,
        delay: Duration,
    }

    struct SlowCommitUnit {
        inner: Box<dyn UnitOfWork>,
        delay: Duration,
    }

    #[async_trait]
    impl Database for SlowCommit {
        async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
            Ok(Box::new(SlowCommitUnit {
                inner: self.inner.begin().await?,
                delay: self.delay,
            }))
        }
    }

    #[async_trait]
    impl BookStore for SlowCommitUnit {
        async fn find_book(&mut self, id: i64) -> AppResult<Option<Book>> {
            self.inner.find_book(id).await
        }

        async fn compare_and_set_availability(
            &mut self,
            id: i64,
            expected: bool,
            new_value: bool,
        ) -> AppResult<bool> {
            self.inner.compare_and_set_availability(id, expected, new_value).await
        }
    }

    #[async_trait]
    impl PatronStore for SlowCommitUnit {
        async fn find_patron(&mut self, id: i64) -> AppResult<Option<Patron>> {
            self.inner.find_patron(id).await
        }
    }

    #[async_trait]
    impl BorrowingLedger for SlowCommitUnit {
        async fn create_open(
            &mut self,
            book_id: i64,
            patron_id: i64,
            borrow_date: NaiveDate,
        ) -> AppResult<BorrowingRecord> {
            self.inner.create_open(book_id, patron_id, borrow_date).await
        }

        async fn find_open_by_book_and_patron(
            &mut self,
            book_id: i64,
            patron_id: i64,
        ) -> AppResult<Option<BorrowingRecord>> {
            self.inner.find_open_by_book_and_patron(book_id, patron_id).await
        }

        async fn close(&mut self, record_id: i64, return_date: NaiveDate) -> AppResult<BorrowingRecord> {
            self.inner.close(record_id, return_date).await
        }
    }

    #[async_trait]
    impl UnitOfWork for SlowCommitUnit {
        async fn commit(self: Box<Self>) -> AppResult<()> {
            self.inner.commit().await?;
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> AppResult<()> {
            self.inner.rollback().await
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    fn coordinator(db: &MemoryDatabase) -> LendingCoordinator {
        LendingCoordinator::new(Arc::new(db.clone()), &LendingConfig::default())
            .with_clock(Arc::new(day))
    }

    #[tokio::test]
    async fn test_borrow_then_return() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;
        let patron = db.add_patron("Ada", "ada@example.org").await;
        let lending = coordinator(&db);

        let borrowed = assert_ok!(lending.borrow(book.id, patron.id).await);
        assert_eq!(borrowed.book_title, "Dune");
        assert_eq!(borrowed.patron_name, "Ada");
        assert_eq!(borrowed.borrow_date, day());
        assert_eq!(borrowed.return_date, None);
        assert!(!db.snapshot().await.books[&book.id].available);

        let returned = assert_ok!(lending.return_book(book.id, patron.id).await);
        assert_eq!(returned.id, borrowed.id);
        assert_eq!(returned.borrow_date, day());
        assert_eq!(returned.return_date, Some(day()));

        let state = db.snapshot().await;
        assert!(state.books[&book.id].available);
        assert_eq!(state.borrowings.len(), 1);
        assert!(state.inconsistent_books().is_empty());
    }

    #[tokio::test]
    async fn test_borrow_unknown_book() {
        let db = MemoryDatabase::new();
        let patron = db.add_patron("Ada", "ada@example.org").await;

        let err = assert_err!(coordinator(&db).borrow(404, patron.id).await);
        assert!(matches!(err, AppError::NotFound(Entity::Book(404))));
    }

    #[tokio::test]
    async fn test_unavailable_book_rejected_before_patron_lookup() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;
        let patron = db.add_patron("Ada", "ada@example.org").await;
        let lending = coordinator(&db);
        assert_ok!(lending.borrow(book.id, patron.id).await);

        // Unknown patron, but the availability check comes first
        let err = assert_err!(lending.borrow(book.id, 999).await);
        assert!(matches!(err, AppError::Conflict(ConflictKind::Unavailable(id)) if id == book.id));
    }

    #[tokio::test]
    async fn test_borrow_unknown_patron_leaves_book_available() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;

        let err = assert_err!(coordinator(&db).borrow(book.id, 999).await);
        assert!(matches!(err, AppError::NotFound(Entity::Patron(999))));
        assert!(db.snapshot().await.books[&book.id].available);
    }

    #[tokio::test]
    async fn test_return_requires_matching_patron() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;
        let borrower = db.add_patron("Ada", "ada@example.org").await;
        let other = db.add_patron("Grace", "grace@example.org").await;
        let lending = coordinator(&db);
        assert_ok!(lending.borrow(book.id, borrower.id).await);

        let err = assert_err!(lending.return_book(book.id, other.id).await);
        assert!(matches!(err, AppError::NotFound(Entity::OpenBorrowing { .. })));
        assert!(!db.snapshot().await.books[&book.id].available);
    }

    #[tokio::test]
    async fn test_failed_create_rolls_back_availability() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;
        let patron = db.add_patron("Ada", "ada@example.org").await;
        db.inject_fault(Fault::CreateOpen).await;

        let err = assert_err!(coordinator(&db).borrow(book.id, patron.id).await);
        assert!(err.is_transient());

        let state = db.snapshot().await;
        assert!(state.books[&book.id].available);
        assert!(state.borrowings.is_empty());
    }

    #[tokio::test]
    async fn test_begin_failure_is_transient() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;
        let patron = db.add_patron("Ada", "ada@example.org").await;
        db.inject_fault(Fault::Begin).await;

        let err = assert_err!(coordinator(&db).borrow(book.id, patron.id).await);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_commit_acknowledgement_is_not_a_failure() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;
        let patron = db.add_patron("Ada", "ada@example.org").await;
        let config = LendingConfig {
            operation_timeout_ms: 50,
            ..LendingConfig::default()
        };
        let slow = SlowCommit {
            inner: db.clone(),
            delay: Duration::from_millis(200),
        };
        let lending = LendingCoordinator::new(Arc::new(slow), &config).with_clock(Arc::new(day));

        let borrowed = assert_ok!(lending.borrow(book.id, patron.id).await);
        let state = db.snapshot().await;
        assert!(!state.books[&book.id].available);
        assert_eq!(state.open_records(book.id).len(), 1);

        let returned = assert_ok!(lending.return_book(book.id, patron.id).await);
        assert_eq!(returned.id, borrowed.id);
        assert!(db.snapshot().await.books[&book.id].available);
    }

    #[tokio::test]
    async fn test_return_with_flag_already_set_rolls_back() {
        let db = MemoryDatabase::new();
        let book = db.add_book("Dune", "Frank Herbert").await;
        let patron = db.add_patron("Ada", "ada@example.org").await;

        // Open record while the book still reads as available
        let mut uow = db.begin().await.unwrap();
        let record = uow.create_open(book.id, patron.id, day()).await.unwrap();
        uow.commit().await.unwrap();

        let err = assert_err!(coordinator(&db).return_book(book.id, patron.id).await);
        assert!(matches!(err, AppError::Internal(_)), "{}", err);

        let state = db.snapshot().await;
        assert!(state.borrowings[&record.id].is_open());
        assert_eq!(state.open_records(book.id).len(), 1);
        assert!(state.books[&book.id].available);
    }
}
