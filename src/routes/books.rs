use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{BookInput, BookSearch, BookUpdate},
    services::catalog,
    state::AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

/// Browses the catalog.
///
/// ## Query Parameters:
/// - `title`, `author`, `isbn` (optional): case-insensitive substring filters.
/// - `genre` (optional): exact genre.
/// - `available` (optional): `true` for books with copies on the shelf, `false` for fully lent ones.
/// - `page` (default 1), `page_size` (default 10, at most 100).
/// - `sort_by` (`title`, `author`, `published_date`, `genre`) and `sort_order` (`asc`, `desc`).
///
/// ## Responses:
/// - `200 OK`: a page of books.
/// - `422 Unprocessable Entity`: paging parameters out of range.
#[get("")]
pub async fn search_books(
    state: web::Data<AppState>,
    query: web::Query<BookSearch>,
) -> Result<impl Responder, AppError> {
    let page = catalog::search_books(state.library.as_ref(), &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Every lendable book, by title.
#[get("/available")]
pub async fn available_books(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let books = catalog::available_books(state.library.as_ref()).await?;
    Ok(HttpResponse::Ok().json(books))
}

#[get("/genres")]
pub async fn genres(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let genres = catalog::genres(state.library.as_ref()).await?;
    Ok(HttpResponse::Ok().json(genres))
}

#[get("/{id}")]
pub async fn get_book(
    state: web::Data<AppState>,
    book_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let book = catalog::get_book(state.library.as_ref(), book_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(book))
}

/// Whether a copy can be borrowed right now. Unknown ids report `false`.
#[get("/{id}/availability")]
pub async fn availability(
    state: web::Data<AppState>,
    book_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let book_id = book_id.into_inner();
    let available = catalog::is_available(state.library.as_ref(), book_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "book_id": book_id,
        "available": available,
    })))
}

/// Adds a book to the catalog. Librarian or admin.
///
/// ## Responses:
/// - `201 Created`: the new book.
/// - `400 Bad Request`: the ISBN is already in the catalog.
/// - `403 Forbidden`: caller is a member.
/// - `422 Unprocessable Entity`: invalid fields or copy counts.
#[post("")]
pub async fn create_book(
    state: web::Data<AppState>,
    book_data: web::Json<BookInput>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    user.require_staff()?;
    let book = catalog::create_book(state.library.as_ref(), book_data.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Created().json(book))
}

/// Partially updates a book. Librarian or admin.
///
/// Changing `total_copies` moves `available_copies` by the same amount
/// unless `available_copies` is also given.
#[put("/{id}")]
pub async fn update_book(
    state: web::Data<AppState>,
    book_id: web::Path<i32>,
    update: web::Json<BookUpdate>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    user.require_staff()?;
    let book = catalog::update_book(
        state.library.as_ref(),
        book_id.into_inner(),
        update.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(book))
}

/// Retires a book from the catalog. Librarian or admin.
#[delete("/{id}")]
pub async fn retire_book(
    state: web::Data<AppState>,
    book_id: web::Path<i32>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    user.require_staff()?;
    catalog::retire_book(state.library.as_ref(), book_id.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::NoContent().finish())
}
