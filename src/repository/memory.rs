//! In-memory lending store.
//!
//! Mirrors what the Postgres store relies on: reads see committed data plus
//! the unit of work's own writes, a book row is locked by the first write that
//! touches it and stays locked until commit or rollback, and staged writes are
//! applied in one step at commit. Faults can be injected to exercise rollback.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BookStore, BorrowingLedger, Database, PatronStore, UnitOfWork};
use crate::{
    error::{AppError, AppResult, ConflictKind, Entity},
    models::{Book, BorrowingRecord, Patron},
};

/// One-shot failure points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Begin,
    CreateOpen,
    Commit,
}

/// Committed contents of the store
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub books: BTreeMap<i64, Book>,
    pub patrons: BTreeMap<i64, Patron>,
    pub borrowings: BTreeMap<i64, BorrowingRecord>,
}

impl Snapshot {
    pub fn open_records(&self, book_id: i64) -> Vec<&BorrowingRecord> {
        self.borrowings
            .values()
            .filter(|r| r.book_id == book_id && r.is_open())
            .collect()
    }

    /// Books whose `available` flag disagrees with their open records
    pub fn inconsistent_books(&self) -> Vec<i64> {
        self.books
            .values()
            .filter(|book| {
                let open = self.open_records(book.id).len();
                open > 1 || book.available != (open == 0)
            })
            .map(|book| book.id)
            .collect()
    }
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Snapshot>,
    row_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    faults: Mutex<HashSet<Fault>>,
    next_book_id: AtomicI64,
    next_patron_id: AtomicI64,
    next_borrowing_id: AtomicI64,
}

impl Shared {
    async fn take_fault(&self, fault: Fault) -> bool {
        self.faults.lock().await.remove(&fault)
    }
}

fn injected(fault: Fault) -> AppError {
    AppError::TransientFailure(format!("injected fault at {:?}", fault))
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog a new, available book
    pub async fn add_book(&self, title: &str, author: &str) -> Book {
        let id = self.shared.next_book_id.fetch_add(1, Ordering::SeqCst) + 1;
        let book = Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
            publication_year: 2000,
            isbn: format!("{:013}", id),
            available: true,
        };
        self.shared.tables.lock().await.books.insert(id, book.clone());
        book
    }

    pub async fn add_patron(&self, name: &str, email: &str) -> Patron {
        let id = self.shared.next_patron_id.fetch_add(1, Ordering::SeqCst) + 1;
        let patron = Patron {
            id,
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
        };
        self.shared.tables.lock().await.patrons.insert(id, patron.clone());
        patron
    }

    /// Make the next call at `fault` fail with a transient error
    pub async fn inject_fault(&self, fault: Fault) {
        self.shared.faults.lock().await.insert(fault);
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.shared.tables.lock().await.clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        if self.shared.take_fault(Fault::Begin).await {
            return Err(injected(Fault::Begin));
        }
        Ok(Box::new(MemoryUnitOfWork {
            shared: self.shared.clone(),
            held: HashMap::new(),
            availability: HashMap::new(),
            created: BTreeMap::new(),
            closed: BTreeMap::new(),
        }))
    }
}

/// Staged writes plus the book row locks taken so far
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    held: HashMap<i64, OwnedMutexGuard<()>>,
    availability: HashMap<i64, bool>,
    created: BTreeMap<i64, BorrowingRecord>,
    closed: BTreeMap<i64, BorrowingRecord>,
}

impl MemoryUnitOfWork {
    /// Never call while holding the table lock: committers hold row locks
    /// while they wait for it.
    async fn lock_book(&mut self, book_id: i64) {
        if self.held.contains_key(&book_id) {
            return;
        }
        let lock = self
            .shared
            .row_locks
            .lock()
            .await
            .entry(book_id)
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        self.held.insert(book_id, guard);
    }

    fn open_for_book(&self, tables: &Snapshot, book_id: i64) -> bool {
        self.created.values().any(|r| r.book_id == book_id && r.is_open())
            || tables
                .borrowings
                .values()
                .any(|r| r.book_id == book_id && r.is_open() && !self.closed.contains_key(&r.id))
    }
}

#[async_trait]
impl BookStore for MemoryUnitOfWork {
    async fn find_book(&mut self, id: i64) -> AppResult<Option<Book>> {
        let tables = self.shared.tables.lock().await;
        let book = tables.books.get(&id).cloned().map(|mut book| {
            if let Some(available) = self.availability.get(&id) {
                book.available = *available;
            }
            book
        });
        Ok(book)
    }

    async fn compare_and_set_availability(
        &mut self,
        id: i64,
        expected: bool,
        new_value: bool,
    ) -> AppResult<bool> {
        self.lock_book(id).await;
        match self.find_book(id).await? {
            Some(book) if book.available == expected => {
                self.availability.insert(id, new_value);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PatronStore for MemoryUnitOfWork {
    async fn find_patron(&mut self, id: i64) -> AppResult<Option<Patron>> {
        Ok(self.shared.tables.lock().await.patrons.get(&id).cloned())
    }
}

#[async_trait]
impl BorrowingLedger for MemoryUnitOfWork {
    async fn create_open(
        &mut self,
        book_id: i64,
        patron_id: i64,
        borrow_date: NaiveDate,
    ) -> AppResult<BorrowingRecord> {
        if self.shared.take_fault(Fault::CreateOpen).await {
            return Err(injected(Fault::CreateOpen));
        }
        self.lock_book(book_id).await;

        {
            let tables = self.shared.tables.lock().await;
            if !tables.books.contains_key(&book_id) {
                return Err(AppError::NotFound(Entity::Book(book_id)));
            }
            if !tables.patrons.contains_key(&patron_id) {
                return Err(AppError::NotFound(Entity::Patron(patron_id)));
            }
            if self.open_for_book(&tables, book_id) {
                return Err(AppError::Conflict(ConflictKind::Unavailable(book_id)));
            }
        }

        let record = BorrowingRecord {
            id: self.shared.next_borrowing_id.fetch_add(1, Ordering::SeqCst) + 1,
            book_id,
            patron_id,
            borrow_date,
            return_date: None,
        };
        self.created.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_open_by_book_and_patron(
        &mut self,
        book_id: i64,
        patron_id: i64,
    ) -> AppResult<Option<BorrowingRecord>> {
        let matches = |r: &&BorrowingRecord| {
            r.book_id == book_id && r.patron_id == patron_id && r.is_open()
        };
        if let Some(record) = self.created.values().find(matches) {
            return Ok(Some(record.clone()));
        }
        let tables = self.shared.tables.lock().await;
        let record = tables
            .borrowings
            .values()
            .filter(|r| !self.closed.contains_key(&r.id))
            .find(matches)
            .cloned();
        Ok(record)
    }

    async fn close(&mut self, record_id: i64, return_date: NaiveDate) -> AppResult<BorrowingRecord> {
        let pair = match self.created.get(&record_id) {
            Some(r) => Some((r.book_id, r.patron_id)),
            None => self
                .shared
                .tables
                .lock()
                .await
                .borrowings
                .get(&record_id)
                .map(|r| (r.book_id, r.patron_id)),
        };
        let Some((book_id, patron_id)) = pair else {
            return Err(AppError::NotFound(Entity::Borrowing(record_id)));
        };
        let not_open = AppError::NotFound(Entity::OpenBorrowing { book_id, patron_id });

        self.lock_book(book_id).await;

        if let Some(record) = self.created.get_mut(&record_id) {
            if !record.is_open() {
                return Err(not_open);
            }
            record.return_date = Some(return_date);
            return Ok(record.clone());
        }

        // Re-read under the row lock: a concurrent return may have committed
        let committed = self.shared.tables.lock().await.borrowings.get(&record_id).cloned();
        match committed {
            Some(mut record) if record.is_open() && !self.closed.contains_key(&record_id) => {
                record.return_date = Some(return_date);
                self.closed.insert(record_id, record.clone());
                Ok(record)
            }
            _ => Err(not_open),
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        if self.shared.take_fault(Fault::Commit).await {
            return Err(injected(Fault::Commit));
        }

        let mut tables = self.shared.tables.lock().await;
        for (id, available) in &self.availability {
            if let Some(book) = tables.books.get_mut(id) {
                book.available = *available;
            }
        }
        for record in self.created.values().chain(self.closed.values()) {
            tables.borrowings.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        drop(self);
        Ok(())
    }
}
