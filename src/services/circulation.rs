//! Borrowing and returning.
//!
//! Both operations run inside one unit of work: the book (or loan) row is
//! locked first, every check runs against the locked copy, and nothing is
//! written unless the whole operation succeeds.

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{BorrowRequest, Loan, NewLoan, ReturnOutcome, ReturnRequest};
use crate::services::fines::fine_for;
use crate::store::LibraryStore;

/// Lending rules that vary per deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct CirculationPolicy {
    /// Days a loan runs when the borrower does not pick a due date.
    pub loan_period_days: i64,
    /// Charged per whole day past the due date.
    pub daily_fine_rate: Decimal,
    /// Whether a copy returned as damaged goes back on the shelf.
    pub restock_damaged: bool,
}

impl Default for CirculationPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            daily_fine_rate: Decimal::new(50, 2),
            restock_damaged: true,
        }
    }
}

impl CirculationPolicy {
    fn restocks(&self, outcome: ReturnOutcome) -> bool {
        match outcome {
            ReturnOutcome::Returned => true,
            ReturnOutcome::Damaged => self.restock_damaged,
            ReturnOutcome::Lost => false,
        }
    }
}

/// Lends one copy of `request.book_id` to `borrower_id`.
pub async fn borrow_book(
    store: &dyn LibraryStore,
    policy: &CirculationPolicy,
    borrower_id: i32,
    request: BorrowRequest,
    now: DateTime<Utc>,
) -> AppResult<Loan> {
    request.validate()?;
    let due_date = match request.due_date {
        Some(due) if due <= now => {
            return Err(AppError::ValidationError(
                "due_date must be in the future".into(),
            ))
        }
        Some(due) => due,
        None => now + Duration::days(policy.loan_period_days),
    };

    let mut uow = store.begin().await?;

    let mut book = uow
        .book_for_update(request.book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", request.book_id)))?;

    if let Err(e) = book.take_copy(now) {
        warn!("Borrow of book {} by user {} rejected: {}", book.id, borrower_id, e);
        return Err(e);
    }

    if uow.has_active_loan(borrower_id, book.id).await? {
        warn!("User {} already holds an active loan for book {}", borrower_id, book.id);
        return Err(AppError::AlreadyBorrowed(format!(
            "User {} already has an active loan for book {}",
            borrower_id, book.id
        )));
    }

    uow.save_book(&book).await?;
    let loan = uow
        .insert_loan(NewLoan {
            borrower_id,
            book_id: book.id,
            borrow_date: now,
            due_date,
            notes: request.notes,
        })
        .await?;
    uow.commit().await?;

    info!(
        "Loan {} created: book {} to user {}, due {} ({} copies left)",
        loan.id, book.id, borrower_id, loan.due_date, book.available_copies
    );
    Ok(loan)
}

/// Closes an active loan and, depending on the outcome, restocks the copy.
pub async fn return_book(
    store: &dyn LibraryStore,
    policy: &CirculationPolicy,
    request: ReturnRequest,
    now: DateTime<Utc>,
) -> AppResult<Loan> {
    request.validate()?;
    if request.fine_amount.is_some_and(|fine| fine.is_sign_negative()) {
        return Err(AppError::ValidationError("fine_amount cannot be negative".into()));
    }

    let mut uow = store.begin().await?;

    let mut loan = uow
        .loan_for_update(request.loan_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", request.loan_id)))?;

    let fine = request
        .fine_amount
        .unwrap_or_else(|| fine_for(&loan, policy.daily_fine_rate, now));
    if let Err(e) = loan.close(request.status, fine, request.notes, now) {
        warn!("Return of loan {} rejected: {}", loan.id, e);
        return Err(e);
    }
    uow.save_loan(&loan).await?;

    if policy.restocks(request.status) {
        let mut book = uow.book_for_update(loan.book_id).await?.ok_or_else(|| {
            AppError::InternalServerError(format!(
                "Loan {} references missing book {}",
                loan.id, loan.book_id
            ))
        })?;
        if book.restock(now) {
            uow.save_book(&book).await?;
        } else {
            warn!(
                "Book {} already has all {} copies on the shelf; not restocking",
                book.id, book.total_copies
            );
        }
    }
    uow.commit().await?;

    info!(
        "Loan {} closed as {:?} with fine {}",
        loan.id, loan.status, fine
    );
    Ok(loan)
}

/// Fine owed on a loan right now. Never writes.
pub async fn calculate_fine(
    store: &dyn LibraryStore,
    policy: &CirculationPolicy,
    loan_id: i32,
    now: DateTime<Utc>,
) -> AppResult<Decimal> {
    let row = store
        .find_loan(loan_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan_id)))?;
    Ok(fine_for(&row.loan, policy.daily_fine_rate, now))
}
