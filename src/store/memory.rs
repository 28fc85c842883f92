//! In-process backend.
//!
//! The catalog and the ledger live behind one async mutex. A unit of work
//! holds that mutex from `begin` until it is committed or dropped and edits
//! a private copy of the state, so units of work are fully serialized and a
//! dropped one leaves nothing behind. Accounts and tasks have their own
//! locks; when both are needed the ledger lock is always taken first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::book::{check_copy_counts, compare_ignore_case};
use crate::models::{
    Book, BookSearch, Loan, LoanRow, LoanSearch, NewBook, NewLoan, NewUser, Page, ProfileUpdate,
    Role, Task, TaskQuery, User, UserCredentials,
};
use crate::store::{LibraryStore, TaskStore, UnitOfWork, UserStore};

#[derive(Debug, Default, Clone)]
struct Ledger {
    books: BTreeMap<i32, Book>,
    loans: BTreeMap<i32, Loan>,
    last_book_id: i32,
    last_loan_id: i32,
}

impl Ledger {
    fn rows(&self, accounts: &Accounts, loans: Vec<Loan>) -> Vec<LoanRow> {
        loans
            .into_iter()
            .map(|loan| {
                let (book_title, book_author) = self
                    .books
                    .get(&loan.book_id)
                    .map(|book| (book.title.clone(), book.author.clone()))
                    .unwrap_or_default();
                let borrower_name = accounts
                    .users
                    .get(&loan.borrower_id)
                    .map(|credentials| credentials.user.full_name.clone())
                    .unwrap_or_default();
                LoanRow {
                    loan,
                    borrower_name,
                    book_title,
                    book_author,
                }
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Accounts {
    users: BTreeMap<i32, UserCredentials>,
    last_user_id: i32,
}

/// Storage backend that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    ledger: Arc<Mutex<Ledger>>,
    accounts: Arc<Mutex<Accounts>>,
    tasks: Arc<Mutex<HashMap<Uuid, Task>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Ledger>,
    working: Ledger,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.working.books.get(&id).cloned())
    }

    async fn isbn_in_use(&mut self, isbn: &str, except_id: Option<i32>) -> AppResult<bool> {
        Ok(self
            .working
            .books
            .values()
            .any(|book| book.isbn == isbn && Some(book.id) != except_id))
    }

    async fn insert_book(&mut self, book: NewBook) -> AppResult<Book> {
        if self.isbn_in_use(&book.isbn, None).await? {
            return Err(AppError::Conflict(format!("ISBN {} already exists", book.isbn)));
        }
        check_copy_counts(book.total_copies, book.available_copies)
            .map_err(|e| AppError::Conflict(e.to_string()))?;
        self.working.last_book_id += 1;
        let book = book.into_book(self.working.last_book_id);
        self.working.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn save_book(&mut self, book: &Book) -> AppResult<()> {
        if !self.working.books.contains_key(&book.id) {
            return Err(AppError::NotFound(format!("Book {} not found", book.id)));
        }
        if self.isbn_in_use(&book.isbn, Some(book.id)).await? {
            return Err(AppError::Conflict(format!("ISBN {} already exists", book.isbn)));
        }
        check_copy_counts(book.total_copies, book.available_copies)
            .map_err(|e| AppError::Conflict(e.to_string()))?;
        self.working.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn has_active_loan(&mut self, borrower_id: i32, book_id: i32) -> AppResult<bool> {
        Ok(self.working.loans.values().any(|loan| {
            loan.is_active() && loan.borrower_id == borrower_id && loan.book_id == book_id
        }))
    }

    async fn active_loans_for_book(&mut self, book_id: i32) -> AppResult<i64> {
        Ok(self
            .working
            .loans
            .values()
            .filter(|loan| loan.is_active() && loan.book_id == book_id)
            .count() as i64)
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> AppResult<Loan> {
        if !self.working.books.contains_key(&loan.book_id) {
            return Err(AppError::NotFound(format!("Book {} not found", loan.book_id)));
        }
        if self.has_active_loan(loan.borrower_id, loan.book_id).await? {
            return Err(AppError::Conflict(
                "An active loan already exists for this borrower and book".into(),
            ));
        }
        self.working.last_loan_id += 1;
        let loan = loan.into_loan(self.working.last_loan_id);
        self.working.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn loan_for_update(&mut self, id: i32) -> AppResult<Option<Loan>> {
        Ok(self.working.loans.get(&id).cloned())
    }

    async fn save_loan(&mut self, loan: &Loan) -> AppResult<()> {
        match self.working.loans.get_mut(&loan.id) {
            Some(stored) => {
                *stored = loan.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Loan {} not found", loan.id))),
        }
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.ledger.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn find_book(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.ledger.lock().await.books.get(&id).cloned())
    }

    async fn search_books(&self, search: &BookSearch) -> AppResult<Page<Book>> {
        let ledger = self.ledger.lock().await;
        let mut books: Vec<Book> = ledger
            .books
            .values()
            .filter(|book| search.matches(book))
            .cloned()
            .collect();
        books.sort_by(|a, b| search.compare(a, b));
        Ok(Page::from_sorted(books, search.page_request()))
    }

    async fn available_books(&self) -> AppResult<Vec<Book>> {
        let ledger = self.ledger.lock().await;
        let mut books: Vec<Book> = ledger
            .books
            .values()
            .filter(|book| book.is_available())
            .cloned()
            .collect();
        books.sort_by(|a, b| compare_ignore_case(&a.title, &b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn genres(&self) -> AppResult<Vec<String>> {
        let ledger = self.ledger.lock().await;
        let genres: BTreeSet<String> = ledger
            .books
            .values()
            .filter(|book| book.is_active())
            .filter_map(|book| book.genre.clone())
            .filter(|genre| !genre.is_empty())
            .collect();
        Ok(genres.into_iter().collect())
    }

    async fn find_loan(&self, id: i32) -> AppResult<Option<LoanRow>> {
        let ledger = self.ledger.lock().await;
        let Some(loan) = ledger.loans.get(&id).cloned() else {
            return Ok(None);
        };
        let accounts = self.accounts.lock().await;
        Ok(ledger.rows(&accounts, vec![loan]).pop())
    }

    async fn search_loans(
        &self,
        search: &LoanSearch,
        now: DateTime<Utc>,
    ) -> AppResult<Page<LoanRow>> {
        let ledger = self.ledger.lock().await;
        let mut loans: Vec<Loan> = ledger
            .loans
            .values()
            .filter(|loan| search.matches(loan, now))
            .cloned()
            .collect();
        loans.sort_by(|a, b| search.compare(a, b));
        let page = Page::from_sorted(loans, search.page_request());
        let accounts = self.accounts.lock().await;
        Ok(Page {
            items: ledger.rows(&accounts, page.items),
            total_count: page.total_count,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        })
    }

    async fn borrower_loans(&self, borrower_id: i32) -> AppResult<Vec<LoanRow>> {
        let ledger = self.ledger.lock().await;
        let mut loans: Vec<Loan> = ledger
            .loans
            .values()
            .filter(|loan| loan.borrower_id == borrower_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        let accounts = self.accounts.lock().await;
        Ok(ledger.rows(&accounts, loans))
    }

    async fn overdue_loans(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanRow>> {
        let ledger = self.ledger.lock().await;
        let mut loans: Vec<Loan> = ledger
            .loans
            .values()
            .filter(|loan| loan.is_overdue(now))
            .cloned()
            .collect();
        loans.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        let accounts = self.accounts.lock().await;
        Ok(ledger.rows(&accounts, loans))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut accounts = self.accounts.lock().await;
        let email_taken = accounts
            .users
            .values()
            .any(|existing| existing.user.email.eq_ignore_ascii_case(&user.email));
        if email_taken {
            return Err(AppError::BadRequest("Email already registered".into()));
        }
        accounts.last_user_id += 1;
        let created = User {
            id: accounts.last_user_id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
            created_at: Utc::now(),
        };
        accounts.users.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn find_credentials(&self, email: &str) -> AppResult<Option<UserCredentials>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .users
            .values()
            .find(|credentials| credentials.user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user(&self, id: i32) -> AppResult<Option<User>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.users.get(&id).map(|credentials| credentials.user.clone()))
    }

    async fn set_role(&self, id: i32, role: Role) -> AppResult<Option<User>> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.users.get_mut(&id).map(|credentials| {
            credentials.user.role = role;
            credentials.user.clone()
        }))
    }

    async fn update_profile(&self, id: i32, update: &ProfileUpdate) -> AppResult<Option<User>> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.users.get_mut(&id).map(|credentials| {
            if let Some(username) = &update.username {
                credentials.user.username = username.clone();
            }
            if let Some(full_name) = &update.full_name {
                credentials.user.full_name = full_name.clone();
            }
            credentials.user.clone()
        }))
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn list_tasks(&self, user_id: i32, query: &TaskQuery) -> AppResult<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let sort = query.sort.unwrap_or_default();
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|task| task.user_id == user_id && query.matches(task))
            .cloned()
            .collect();
        found.sort_by(|a, b| sort.compare(a, b));
        Ok(found)
    }

    async fn find_task(&self, user_id: i32, id: Uuid) -> AppResult<Option<Task>> {
        let tasks = self.tasks.lock().await;
        Ok(tasks.get(&id).filter(|task| task.user_id == user_id).cloned())
    }

    async fn insert_task(&self, task: &Task) -> AppResult<Task> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.id) {
            return Err(AppError::Conflict(format!("Task {} already exists", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn update_task(&self, task: &Task) -> AppResult<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&task.id) {
            Some(stored) if stored.user_id == task.user_id => {
                *stored = task.clone();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_task(&self, user_id: i32, id: Uuid) -> AppResult<bool> {
        let mut tasks = self.tasks.lock().await;
        let owned = tasks.get(&id).is_some_and(|task| task.user_id == user_id);
        if owned {
            tasks.remove(&id);
        }
        Ok(owned)
    }
}
