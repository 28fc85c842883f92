use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{BorrowRequest, LoanSearch, ReturnRequest},
    services::{circulation, ledger},
    state::AppState,
};
use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

/// What members see when a borrow is refused.
const BORROW_REFUSED: &str = "Could not borrow this book";

/// Borrows a book for the caller.
///
/// ## Request Body:
/// - `book_id`: the book to borrow.
/// - `due_date` (optional): must be in the future; defaults to the configured loan period.
/// - `notes` (optional).
///
/// ## Responses:
/// - `201 Created`: the new loan with its details.
/// - `404 Not Found`: no such book.
/// - `409 Conflict`: no copy available, the caller already holds this book,
///   or a concurrent borrow won the race. Members get a generic message;
///   staff see the reason.
/// - `422 Unprocessable Entity`: due date not in the future.
#[post("/borrow")]
pub async fn borrow(
    state: web::Data<AppState>,
    borrow_data: web::Json<BorrowRequest>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let now = Utc::now();
    let loan = circulation::borrow_book(
        state.library.as_ref(),
        &state.policy,
        user.id,
        borrow_data.into_inner(),
        now,
    )
    .await
    .map_err(|e| {
        if user.is_staff() {
            e
        } else {
            e.with_public_message(BORROW_REFUSED)
        }
    })?;

    let details = ledger::get_loan(state.library.as_ref(), loan.id, now).await?;
    Ok(HttpResponse::Created().json(details))
}

/// Closes a loan. Librarian or admin.
///
/// `status` is one of `returned` (default), `lost` or `damaged`. The fine
/// is computed from the due date unless `fine_amount` overrides it.
#[post("/return")]
pub async fn return_loan(
    state: web::Data<AppState>,
    return_data: web::Json<ReturnRequest>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    user.require_staff()?;
    let now = Utc::now();
    let loan = circulation::return_book(
        state.library.as_ref(),
        &state.policy,
        return_data.into_inner(),
        now,
    )
    .await?;

    let details = ledger::get_loan(state.library.as_ref(), loan.id, now).await?;
    Ok(HttpResponse::Ok().json(details))
}

/// Searches the whole ledger. Librarian or admin.
#[get("")]
pub async fn search_loans(
    state: web::Data<AppState>,
    query: web::Query<LoanSearch>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    user.require_staff()?;
    let page = ledger::search_loans(state.library.as_ref(), &query, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// The caller's loans, newest first.
#[get("/mine")]
pub async fn my_loans(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let loans = ledger::borrower_loans(state.library.as_ref(), user.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(loans))
}

#[get("/overdue")]
pub async fn overdue_loans(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    user.require_staff()?;
    let loans = ledger::overdue_loans(state.library.as_ref(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(loans))
}

#[get("/{id}")]
pub async fn get_loan(
    state: web::Data<AppState>,
    loan_id: web::Path<i32>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let details = ledger::get_loan(state.library.as_ref(), loan_id.into_inner(), Utc::now()).await?;
    user.require_owner_or_staff(details.loan.borrower_id)?;
    Ok(HttpResponse::Ok().json(details))
}

/// Fine owed on a loan as of now.
#[get("/{id}/fine")]
pub async fn loan_fine(
    state: web::Data<AppState>,
    loan_id: web::Path<i32>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let loan_id = loan_id.into_inner();
    let now = Utc::now();
    let details = ledger::get_loan(state.library.as_ref(), loan_id, now).await?;
    user.require_owner_or_staff(details.loan.borrower_id)?;

    let fine = circulation::calculate_fine(state.library.as_ref(), &state.policy, loan_id, now).await?;
    Ok(HttpResponse::Ok().json(json!({
        "loan_id": loan_id,
        "fine_amount": fine,
        "days_overdue": details.days_overdue,
        "calculated_at": now,
    })))
}
