//! PostgreSQL backend.
//!
//! A unit of work wraps one transaction. Rows loaded through the
//! `*_for_update` methods are fetched with `SELECT ... FOR UPDATE`, so two
//! borrows of the same book queue up behind each other instead of both
//! reading the same `available_copies`. The schema repeats the important
//! invariants as constraints (see `migrations/`), and violations surface as
//! `AppError::Conflict` through the `sqlx::Error` conversion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Book, BookSearch, Loan, LoanRow, LoanSearch, NewBook, NewLoan, NewUser, Page, ProfileUpdate,
    Role, Task, TaskQuery, User, UserCredentials,
};
use crate::store::{LibraryStore, TaskStore, UnitOfWork, UserStore};

const BOOK_COLUMNS: &str = "id, title, author, isbn, genre, publisher, published_date, \
     total_copies, available_copies, price, description, image_url, state, created_at, updated_at";

const LOAN_COLUMNS: &str = "id, borrower_id, book_id, borrow_date, due_date, return_date, \
     status, fine_amount, notes, created_at, updated_at";

const LOAN_ROW_SELECT: &str = "SELECT l.id, l.borrower_id, l.book_id, l.borrow_date, \
     l.due_date, l.return_date, l.status, l.fine_amount, l.notes, l.created_at, l.updated_at, \
     u.full_name AS borrower_name, b.title AS book_title, b.author AS book_author \
     FROM loans l JOIN users u ON u.id = l.borrower_id JOIN books b ON b.id = l.book_id";

const USER_COLUMNS: &str = "id, username, full_name, email, role, created_at";

const TASK_COLUMNS: &str =
    "id, title, description, priority, status, due_date, created_at, updated_at, user_id";

/// Storage backend on a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {}", e)))?;
        info!("Database migrations applied");
        Ok(())
    }
}

/// `%term%` for ILIKE, with the pattern metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_book_filters(builder: &mut QueryBuilder<'_, Postgres>, search: &BookSearch) {
    builder.push(" WHERE state = 'active'");
    if let Some(title) = &search.title {
        builder.push(" AND title ILIKE ").push_bind(like_pattern(title));
    }
    if let Some(author) = &search.author {
        builder.push(" AND author ILIKE ").push_bind(like_pattern(author));
    }
    if let Some(genre) = &search.genre {
        builder.push(" AND genre = ").push_bind(genre.clone());
    }
    if let Some(isbn) = &search.isbn {
        builder.push(" AND isbn ILIKE ").push_bind(like_pattern(isbn));
    }
    match search.available {
        Some(true) => {
            builder.push(" AND available_copies > 0");
        }
        Some(false) => {
            builder.push(" AND available_copies = 0");
        }
        None => {}
    }
}

fn push_loan_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    search: &LoanSearch,
    now: DateTime<Utc>,
) {
    builder.push(" WHERE TRUE");
    if let Some(borrower_id) = search.borrower_id {
        builder.push(" AND l.borrower_id = ").push_bind(borrower_id);
    }
    if let Some(book_id) = search.book_id {
        builder.push(" AND l.book_id = ").push_bind(book_id);
    }
    if let Some(status) = search.status {
        builder.push(" AND l.status = ").push_bind(status);
    }
    if let Some(from) = search.borrowed_from {
        builder.push(" AND l.borrow_date >= ").push_bind(from);
    }
    if let Some(to) = search.borrowed_to {
        builder.push(" AND l.borrow_date <= ").push_bind(to);
    }
    if let Some(from) = search.due_from {
        builder.push(" AND l.due_date >= ").push_bind(from);
    }
    if let Some(to) = search.due_to {
        builder.push(" AND l.due_date <= ").push_bind(to);
    }
    match search.overdue {
        Some(true) => {
            builder
                .push(" AND l.status = 'active' AND l.due_date < ")
                .push_bind(now);
        }
        Some(false) => {
            builder
                .push(" AND NOT (l.status = 'active' AND l.due_date < ")
                .push_bind(now)
                .push(")");
        }
        None => {}
    }
}

/// One transaction on the pool.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn isbn_in_use(&mut self, isbn: &str, except_id: Option<i32>) -> AppResult<bool> {
        let in_use = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND ($2::INT IS NULL OR id <> $2))",
        )
        .bind(isbn)
        .bind(except_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(in_use)
    }

    async fn insert_book(&mut self, book: NewBook) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "INSERT INTO books (title, author, isbn, genre, publisher, published_date, \
             total_copies, available_copies, price, description, image_url, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(book.title)
        .bind(book.author)
        .bind(book.isbn)
        .bind(book.genre)
        .bind(book.publisher)
        .bind(book.published_date)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.price)
        .bind(book.description)
        .bind(book.image_url)
        .bind(book.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn save_book(&mut self, book: &Book) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE books SET title = $2, author = $3, isbn = $4, genre = $5, publisher = $6, \
             published_date = $7, total_copies = $8, available_copies = $9, price = $10, \
             description = $11, image_url = $12, state = $13, updated_at = $14 WHERE id = $1",
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.genre)
        .bind(&book.publisher)
        .bind(book.published_date)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.price)
        .bind(&book.description)
        .bind(&book.image_url)
        .bind(book.state)
        .bind(book.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book {} not found", book.id)));
        }
        Ok(())
    }

    async fn has_active_loan(&mut self, borrower_id: i32, book_id: i32) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM loans \
             WHERE borrower_id = $1 AND book_id = $2 AND status = 'active')",
        )
        .bind(borrower_id)
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn active_loans_for_book(&mut self, book_id: i32) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM loans WHERE book_id = $1 AND status = 'active'",
        )
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "INSERT INTO loans (borrower_id, book_id, borrow_date, due_date, notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $3) RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(loan.borrower_id)
        .bind(loan.book_id)
        .bind(loan.borrow_date)
        .bind(loan.due_date)
        .bind(loan.notes)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn loan_for_update(&mut self, id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn save_loan(&mut self, loan: &Loan) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE loans SET status = $2, return_date = $3, fine_amount = $4, notes = $5, \
             due_date = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(loan.id)
        .bind(loan.status)
        .bind(loan.return_date)
        .bind(loan.fine_amount)
        .bind(&loan.notes)
        .bind(loan.due_date)
        .bind(loan.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Loan {} not found", loan.id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_book(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn search_books(&self, search: &BookSearch) -> AppResult<Page<Book>> {
        let request = search.page_request();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books");
        push_book_filters(&mut count, search);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM books", BOOK_COLUMNS));
        push_book_filters(&mut select, search);
        select
            .push(format!(
                " ORDER BY {} {}, id ASC LIMIT ",
                search.sort_key().column(),
                search.order().as_sql()
            ))
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());
        let books = select.build_query_as::<Book>().fetch_all(&self.pool).await?;

        Ok(Page::new(books, total, request))
    }

    async fn available_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE state = 'active' AND available_copies > 0 \
             ORDER BY LOWER(title), id",
            BOOK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn genres(&self) -> AppResult<Vec<String>> {
        let genres = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT genre FROM books \
             WHERE state = 'active' AND genre IS NOT NULL AND genre <> '' ORDER BY genre",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(genres)
    }

    async fn find_loan(&self, id: i32) -> AppResult<Option<LoanRow>> {
        let row = sqlx::query_as::<_, LoanRow>(&format!("{} WHERE l.id = $1", LOAN_ROW_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn search_loans(
        &self,
        search: &LoanSearch,
        now: DateTime<Utc>,
    ) -> AppResult<Page<LoanRow>> {
        let request = search.page_request();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans l");
        push_loan_filters(&mut count, search, now);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(LOAN_ROW_SELECT);
        push_loan_filters(&mut select, search, now);
        select
            .push(format!(
                " ORDER BY {} {}, l.id ASC LIMIT ",
                search.sort_key().column(),
                search.order().as_sql()
            ))
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());
        let rows = select
            .build_query_as::<LoanRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, total, request))
    }

    async fn borrower_loans(&self, borrower_id: i32) -> AppResult<Vec<LoanRow>> {
        let rows = sqlx::query_as::<_, LoanRow>(&format!(
            "{} WHERE l.borrower_id = $1 ORDER BY l.borrow_date DESC, l.id DESC",
            LOAN_ROW_SELECT
        ))
        .bind(borrower_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn overdue_loans(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanRow>> {
        let rows = sqlx::query_as::<_, LoanRow>(&format!(
            "{} WHERE l.status = 'active' AND l.due_date < $1 ORDER BY l.due_date ASC, l.id ASC",
            LOAN_ROW_SELECT
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, full_name, email, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.username)
        .bind(user.full_name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::BadRequest("Email already registered".into())
            }
            _ => e.into(),
        })
    }

    async fn find_credentials(&self, email: &str) -> AppResult<Option<UserCredentials>> {
        let credentials = sqlx::query_as::<_, UserCredentials>(&format!(
            "SELECT {}, password_hash FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credentials)
    }

    async fn find_user(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_role(&self, id: i32, role: Role) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: i32, update: &ProfileUpdate) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET username = COALESCE($2, username), \
             full_name = COALESCE($3, full_name) WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&update.username)
        .bind(&update.full_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn list_tasks(&self, user_id: i32, query: &TaskQuery) -> AppResult<Vec<Task>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM tasks WHERE user_id = ",
            TASK_COLUMNS
        ));
        builder.push_bind(user_id);
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(priority) = query.priority {
            builder.push(" AND priority = ").push_bind(priority);
        }
        if let Some(term) = &query.search {
            let pattern = like_pattern(term);
            builder
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        builder.push(" ORDER BY ");
        builder.push(query.sort.unwrap_or_default().as_sql());

        let tasks = builder.build_query_as::<Task>().fetch_all(&self.pool).await?;
        Ok(tasks)
    }

    async fn find_task(&self, user_id: i32, id: Uuid) -> AppResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1 AND user_id = $2",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn insert_task(&self, task: &Task) -> AppResult<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (id, title, description, priority, status, due_date, \
             created_at, updated_at, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.due_date)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn update_task(&self, task: &Task) -> AppResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET title = $3, description = $4, priority = $5, status = $6, \
             due_date = $7, updated_at = $8 WHERE id = $1 AND user_id = $2 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task.id)
        .bind(task.user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.due_date)
        .bind(task.updated_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn delete_task(&self, user_id: i32, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
