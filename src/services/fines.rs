use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::Loan;

/// Fine owed on `loan` at `now`: one `daily_rate` per whole day past the
/// due date. Closed loans and loans not yet due owe nothing.
pub fn fine_for(loan: &Loan, daily_rate: Decimal, now: DateTime<Utc>) -> Decimal {
    Decimal::from(loan.days_overdue(now)) * daily_rate
}
