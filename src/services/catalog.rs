//! Catalog maintenance and browsing.

use chrono::{DateTime, Utc};
use log::{info, warn};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Book, BookInput, BookSearch, BookUpdate, NewBook, Page};
use crate::store::LibraryStore;

fn not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Book {} not found", id))
}

fn duplicate_isbn(isbn: &str) -> AppError {
    AppError::BadRequest(format!("A book with ISBN {} already exists", isbn))
}

pub async fn create_book(
    store: &dyn LibraryStore,
    input: BookInput,
    now: DateTime<Utc>,
) -> AppResult<Book> {
    let new_book = NewBook::from_input(input, now)?;

    let mut uow = store.begin().await?;
    if uow.isbn_in_use(&new_book.isbn, None).await? {
        warn!("Rejected duplicate ISBN {}", new_book.isbn);
        return Err(duplicate_isbn(&new_book.isbn));
    }
    let book = uow.insert_book(new_book).await?;
    uow.commit().await?;

    info!("Book {} added with {} copies", book.id, book.total_copies);
    Ok(book)
}

/// Partial update of an active book. Retired books are treated as missing.
/// The shelf can never hold more copies than are not out on loan.
pub async fn update_book(
    store: &dyn LibraryStore,
    id: i32,
    update: BookUpdate,
    now: DateTime<Utc>,
) -> AppResult<Book> {
    update.validate()?;

    let mut uow = store.begin().await?;
    let mut book = uow
        .book_for_update(id)
        .await?
        .filter(Book::is_active)
        .ok_or_else(|| not_found(id))?;

    if let Some(isbn) = update.isbn.as_deref() {
        if isbn != book.isbn && uow.isbn_in_use(isbn, Some(id)).await? {
            warn!("Rejected ISBN change of book {} to duplicate {}", id, isbn);
            return Err(duplicate_isbn(isbn));
        }
    }
    book.apply(update, now)?;

    let on_loan = uow.active_loans_for_book(id).await?;
    let shelf_limit = i64::from(book.total_copies) - on_loan;
    if i64::from(book.available_copies) > shelf_limit {
        warn!(
            "Rejected copy counts for book {}: {} available with {} of {} on loan",
            id, book.available_copies, on_loan, book.total_copies
        );
        return Err(AppError::ValidationError(format!(
            "available_copies cannot exceed {} while {} copies are on loan",
            shelf_limit.max(0),
            on_loan
        )));
    }
    uow.save_book(&book).await?;
    uow.commit().await?;

    info!(
        "Book {} updated ({}/{} copies available)",
        book.id, book.available_copies, book.total_copies
    );
    Ok(book)
}

/// Soft-deletes a book. Loan history keeps pointing at it.
pub async fn retire_book(store: &dyn LibraryStore, id: i32, now: DateTime<Utc>) -> AppResult<()> {
    let mut uow = store.begin().await?;
    let mut book = uow.book_for_update(id).await?.ok_or_else(|| not_found(id))?;
    book.retire(now);
    uow.save_book(&book).await?;
    uow.commit().await?;

    info!("Book {} retired with {} copies still on loan", id, book.borrowed_copies());
    Ok(())
}

/// An active book by id.
pub async fn get_book(store: &dyn LibraryStore, id: i32) -> AppResult<Book> {
    store
        .find_book(id)
        .await?
        .filter(Book::is_active)
        .ok_or_else(|| not_found(id))
}

/// True when the book exists, is active and has a copy on the shelf.
/// Missing books are simply unavailable.
pub async fn is_available(store: &dyn LibraryStore, id: i32) -> AppResult<bool> {
    Ok(store
        .find_book(id)
        .await?
        .is_some_and(|book| book.is_available()))
}

pub async fn search_books(store: &dyn LibraryStore, search: &BookSearch) -> AppResult<Page<Book>> {
    search.validate()?;
    store.search_books(search).await
}

pub async fn available_books(store: &dyn LibraryStore) -> AppResult<Vec<Book>> {
    store.available_books().await
}

pub async fn genres(store: &dyn LibraryStore) -> AppResult<Vec<String>> {
    store.genres().await
}
