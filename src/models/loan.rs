use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::cmp::Ordering;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::book::nulls_last;
use crate::models::page::{PageRequest, SortOrder};

/// Status of a loan.
/// Corresponds to the `loan_status` SQL enum. Declaration order matches the
/// SQL enum so sorting agrees between backends.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type,
)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// The copy is out with the borrower. The only non-terminal state.
    Active,
    Returned,
    Lost,
    Damaged,
}

impl LoanStatus {
    pub fn is_terminal(self) -> bool {
        self != LoanStatus::Active
    }
}

/// How a loan was closed. Deliberately has no `Active` variant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReturnOutcome {
    #[default]
    Returned,
    Lost,
    Damaged,
}

impl From<ReturnOutcome> for LoanStatus {
    fn from(outcome: ReturnOutcome) -> Self {
        match outcome {
            ReturnOutcome::Returned => LoanStatus::Returned,
            ReturnOutcome::Lost => LoanStatus::Lost,
            ReturnOutcome::Damaged => LoanStatus::Damaged,
        }
    }
}

/// A borrowing record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Loan {
    pub id: i32,
    pub borrower_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub fine_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now > self.due_date
    }

    /// Whole days past the due date; zero unless overdue.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if self.is_overdue(now) {
            (now - self.due_date).num_days()
        } else {
            0
        }
    }

    /// Moves an active loan into a terminal state.
    pub fn close(
        &mut self,
        outcome: ReturnOutcome,
        fine_amount: Decimal,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::AlreadyReturned(format!(
                "Loan {} is already closed as {:?}",
                self.id, self.status
            )));
        }
        self.status = outcome.into();
        self.return_date = Some(now);
        self.fine_amount = Some(fine_amount);
        self.notes = notes;
        self.updated_at = Some(now);
        Ok(())
    }
}

/// A loan about to be recorded.
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub borrower_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewLoan {
    pub fn into_loan(self, id: i32) -> Loan {
        Loan {
            id,
            borrower_id: self.borrower_id,
            book_id: self.book_id,
            borrow_date: self.borrow_date,
            due_date: self.due_date,
            return_date: None,
            status: LoanStatus::Active,
            fine_amount: None,
            notes: self.notes,
            created_at: self.borrow_date,
            updated_at: None,
        }
    }
}

/// Body of `POST /api/loans/borrow`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BorrowRequest {
    pub book_id: i32,
    /// Defaults to the configured loan period.
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Body of `POST /api/loans/return`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReturnRequest {
    pub loan_id: i32,
    #[serde(default)]
    pub status: ReturnOutcome,
    /// Overrides the computed fine.
    pub fine_amount: Option<Decimal>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Loan joined with the names callers want to display.
#[derive(Debug, Clone, FromRow)]
pub struct LoanRow {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub borrower_name: String,
    pub book_title: String,
    pub book_author: String,
}

/// Read model returned by the loan endpoints. Derived fields are evaluated
/// at the time of the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub borrower_name: String,
    pub book_title: String,
    pub book_author: String,
    pub is_overdue: bool,
    pub days_overdue: i64,
    pub is_returned: bool,
}

impl LoanDetails {
    pub fn from_row(row: LoanRow, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: row.loan.is_overdue(now),
            days_overdue: row.loan.days_overdue(now),
            is_returned: row.loan.status == LoanStatus::Returned,
            loan: row.loan,
            borrower_name: row.borrower_name,
            book_title: row.book_title,
            book_author: row.book_author,
        }
    }
}

/// Loan sort keys.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoanSortKey {
    #[default]
    BorrowDate,
    DueDate,
    ReturnDate,
    Status,
}

impl LoanSortKey {
    pub fn column(self) -> &'static str {
        match self {
            LoanSortKey::BorrowDate => "l.borrow_date",
            LoanSortKey::DueDate => "l.due_date",
            LoanSortKey::ReturnDate => "l.return_date",
            LoanSortKey::Status => "l.status",
        }
    }

    pub fn compare(self, a: &Loan, b: &Loan) -> Ordering {
        match self {
            LoanSortKey::BorrowDate => a.borrow_date.cmp(&b.borrow_date),
            LoanSortKey::DueDate => a.due_date.cmp(&b.due_date),
            LoanSortKey::ReturnDate => nulls_last(&a.return_date, &b.return_date),
            LoanSortKey::Status => a.status.cmp(&b.status),
        }
    }
}

/// Query parameters for the loan ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LoanSearch {
    pub borrower_id: Option<i32>,
    pub book_id: Option<i32>,
    pub status: Option<LoanStatus>,
    pub borrowed_from: Option<DateTime<Utc>>,
    pub borrowed_to: Option<DateTime<Utc>>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    /// `true` keeps active loans past due, `false` everything else.
    pub overdue: Option<bool>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<u32>,
    pub sort_by: Option<LoanSortKey>,
    pub sort_order: Option<SortOrder>,
}

impl LoanSearch {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.page_size)
    }

    pub fn sort_key(&self) -> LoanSortKey {
        self.sort_by.unwrap_or_default()
    }

    pub fn order(&self) -> SortOrder {
        self.sort_order.unwrap_or(SortOrder::Desc)
    }

    pub fn matches(&self, loan: &Loan, now: DateTime<Utc>) -> bool {
        if self.borrower_id.is_some_and(|id| id != loan.borrower_id) {
            return false;
        }
        if self.book_id.is_some_and(|id| id != loan.book_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != loan.status) {
            return false;
        }
        if self.borrowed_from.is_some_and(|from| loan.borrow_date < from) {
            return false;
        }
        if self.borrowed_to.is_some_and(|to| loan.borrow_date > to) {
            return false;
        }
        if self.due_from.is_some_and(|from| loan.due_date < from) {
            return false;
        }
        if self.due_to.is_some_and(|to| loan.due_date > to) {
            return false;
        }
        match self.overdue {
            Some(wanted) => loan.is_overdue(now) == wanted,
            None => true,
        }
    }

    pub fn compare(&self, a: &Loan, b: &Loan) -> Ordering {
        self.order()
            .apply(self.sort_key().compare(a, b))
            .then_with(|| a.id.cmp(&b.id))
    }
}
