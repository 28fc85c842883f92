//! Storage seams.
//!
//! Every write to the catalog or the loan ledger happens inside a
//! [`UnitOfWork`] obtained from [`LibraryStore::begin`]. Rows read through
//! the `*_for_update` methods stay locked until the unit of work commits or
//! is dropped, and dropping without [`UnitOfWork::commit`] discards every
//! change made through it.
//!
//! Two backends implement these traits: [`PgStore`] on PostgreSQL and
//! [`MemoryStore`], which keeps everything in process.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Book, BookSearch, Loan, LoanRow, LoanSearch, NewBook, NewLoan, NewUser, Page, ProfileUpdate,
    Role, Task, TaskQuery, User, UserCredentials,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A single atomic transaction against the catalog and the ledger.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads a book and locks it for the rest of the unit of work.
    async fn book_for_update(&mut self, id: i32) -> AppResult<Option<Book>>;

    /// True when another book already uses `isbn`.
    async fn isbn_in_use(&mut self, isbn: &str, except_id: Option<i32>) -> AppResult<bool>;

    async fn insert_book(&mut self, book: NewBook) -> AppResult<Book>;

    async fn save_book(&mut self, book: &Book) -> AppResult<()>;

    /// True when the borrower holds an active loan for the book.
    async fn has_active_loan(&mut self, borrower_id: i32, book_id: i32) -> AppResult<bool>;

    /// Number of copies of the book currently out on active loans.
    async fn active_loans_for_book(&mut self, book_id: i32) -> AppResult<i64>;

    async fn insert_loan(&mut self, loan: NewLoan) -> AppResult<Loan>;

    /// Loads a loan and locks it for the rest of the unit of work.
    async fn loan_for_update(&mut self, id: i32) -> AppResult<Option<Loan>>;

    async fn save_loan(&mut self, loan: &Loan) -> AppResult<()>;

    /// Makes every change visible at once.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Catalog and ledger storage.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;

    /// Any book, active or retired.
    async fn find_book(&self, id: i32) -> AppResult<Option<Book>>;

    async fn search_books(&self, search: &BookSearch) -> AppResult<Page<Book>>;

    /// Active books with at least one copy on the shelf, by title.
    async fn available_books(&self) -> AppResult<Vec<Book>>;

    /// Distinct non-empty genres of active books, sorted.
    async fn genres(&self) -> AppResult<Vec<String>>;

    async fn find_loan(&self, id: i32) -> AppResult<Option<LoanRow>>;

    async fn search_loans(&self, search: &LoanSearch, now: DateTime<Utc>)
        -> AppResult<Page<LoanRow>>;

    /// All loans of one borrower, newest first.
    async fn borrower_loans(&self, borrower_id: i32) -> AppResult<Vec<LoanRow>>;

    /// Active loans past due, earliest due date first.
    async fn overdue_loans(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanRow>>;
}

/// Account storage for the access layer.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `BadRequest` when the email is already registered.
    async fn insert_user(&self, user: NewUser) -> AppResult<User>;

    async fn find_credentials(&self, email: &str) -> AppResult<Option<UserCredentials>>;

    async fn find_user(&self, id: i32) -> AppResult<Option<User>>;

    async fn set_role(&self, id: i32, role: Role) -> AppResult<Option<User>>;

    /// Applies the present fields of `update`. `None` when the user is gone.
    async fn update_profile(&self, id: i32, update: &ProfileUpdate) -> AppResult<Option<User>>;
}

/// Task manager storage. Every call is scoped to the owning user.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_tasks(&self, user_id: i32, query: &TaskQuery) -> AppResult<Vec<Task>>;

    async fn find_task(&self, user_id: i32, id: Uuid) -> AppResult<Option<Task>>;

    async fn insert_task(&self, task: &Task) -> AppResult<Task>;

    /// Returns `None` when the task does not exist for this user.
    async fn update_task(&self, task: &Task) -> AppResult<Option<Task>>;

    /// Returns `false` when nothing was deleted.
    async fn delete_task(&self, user_id: i32, id: Uuid) -> AppResult<bool>;
}
