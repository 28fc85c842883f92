use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::cmp::Ordering;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::page::{PageRequest, SortOrder};

lazy_static! {
    // ISBN-10 or ISBN-13, optionally hyphenated; ISBN-10 may end in X.
    static ref ISBN_REGEX: regex::Regex = regex::Regex::new(r"^[0-9][0-9-]{8,18}[0-9Xx]$").unwrap();
}

/// Lifecycle state of a catalog entry.
/// Corresponds to the `book_state` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "book_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookState {
    /// Listed in the catalog and lendable.
    Active,
    /// Soft-deleted. Kept so loan history stays intact.
    Retired,
}

/// A catalog entry as stored in the database and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub state: BookState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    pub fn is_active(&self) -> bool {
        self.state == BookState::Active
    }

    /// True when the book can be lent right now.
    pub fn is_available(&self) -> bool {
        self.is_active() && self.available_copies > 0
    }

    pub fn borrowed_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    /// Takes one copy off the shelf for a new loan.
    pub fn take_copy(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if !self.is_active() {
            return Err(AppError::Unavailable(format!(
                "Book {} has been retired from the catalog",
                self.id
            )));
        }
        if self.available_copies <= 0 {
            return Err(AppError::Unavailable(format!(
                "No copies of book {} are available",
                self.id
            )));
        }
        self.available_copies -= 1;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Puts one copy back on the shelf. Returns `false` when the shelf is
    /// already full, which only happens after a manual count override.
    pub fn restock(&mut self, now: DateTime<Utc>) -> bool {
        if self.available_copies >= self.total_copies {
            return false;
        }
        self.available_copies += 1;
        self.updated_at = Some(now);
        true
    }

    pub fn retire(&mut self, now: DateTime<Utc>) {
        self.state = BookState::Retired;
        self.updated_at = Some(now);
    }

    /// Applies a partial update. Changing `total_copies` shifts
    /// `available_copies` by the same delta; an explicit `available_copies`
    /// wins over the shift.
    pub fn apply(&mut self, update: BookUpdate, now: DateTime<Utc>) -> AppResult<()> {
        let mut total = self.total_copies;
        let mut available = self.available_copies;
        if let Some(new_total) = update.total_copies {
            available += new_total - total;
            total = new_total;
        }
        if let Some(new_available) = update.available_copies {
            available = new_available;
        }
        check_copy_counts(total, available)?;
        if let Some(price) = update.price {
            check_price(price)?;
        }

        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(author) = update.author {
            self.author = author;
        }
        if let Some(isbn) = update.isbn {
            self.isbn = isbn;
        }
        if update.genre.is_some() {
            self.genre = update.genre;
        }
        if update.publisher.is_some() {
            self.publisher = update.publisher;
        }
        if update.published_date.is_some() {
            self.published_date = update.published_date;
        }
        if update.price.is_some() {
            self.price = update.price;
        }
        if update.description.is_some() {
            self.description = update.description;
        }
        if update.image_url.is_some() {
            self.image_url = update.image_url;
        }
        self.total_copies = total;
        self.available_copies = available;
        self.updated_at = Some(now);
        Ok(())
    }
}

pub fn check_copy_counts(total: i32, available: i32) -> AppResult<()> {
    if total < 1 {
        return Err(AppError::ValidationError(
            "total_copies must be at least 1".into(),
        ));
    }
    if available < 0 || available > total {
        return Err(AppError::ValidationError(format!(
            "available_copies must be between 0 and {} (borrowed copies cannot exceed the total)",
            total
        )));
    }
    Ok(())
}

fn check_price(price: Decimal) -> AppResult<()> {
    if price.is_sign_negative() {
        return Err(AppError::ValidationError("price cannot be negative".into()));
    }
    Ok(())
}

/// Payload for adding a book to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BookInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub author: String,
    #[validate(regex(path = "ISBN_REGEX", message = "ISBN must be 10-20 digits or hyphens"))]
    pub isbn: String,
    #[validate(length(max = 50))]
    pub genre: Option<String>,
    #[validate(length(max = 100))]
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: i32,
    /// Defaults to `total_copies`.
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available_copies: Option<i32>,
    pub price: Option<Decimal>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// A validated book ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewBook {
    pub fn from_input(input: BookInput, now: DateTime<Utc>) -> AppResult<Self> {
        input.validate()?;
        let available = input.available_copies.unwrap_or(input.total_copies);
        check_copy_counts(input.total_copies, available)?;
        if let Some(price) = input.price {
            check_price(price)?;
        }
        Ok(Self {
            title: input.title,
            author: input.author,
            isbn: input.isbn,
            genre: input.genre.filter(|g| !g.trim().is_empty()),
            publisher: input.publisher,
            published_date: input.published_date,
            total_copies: input.total_copies,
            available_copies: available,
            price: input.price,
            description: input.description,
            image_url: input.image_url,
            created_at: now,
        })
    }

    /// Materializes the row once storage has assigned an id.
    pub fn into_book(self, id: i32) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            genre: self.genre,
            publisher: self.publisher,
            published_date: self.published_date,
            total_copies: self.total_copies,
            available_copies: self.available_copies,
            price: self.price,
            description: self.description,
            image_url: self.image_url,
            state: BookState::Active,
            created_at: self.created_at,
            updated_at: None,
        }
    }
}

/// Partial update of a catalog entry. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct BookUpdate {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub author: Option<String>,
    #[validate(regex(path = "ISBN_REGEX", message = "ISBN must be 10-20 digits or hyphens"))]
    pub isbn: Option<String>,
    #[validate(length(max = 50))]
    pub genre: Option<String>,
    #[validate(length(max = 100))]
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: Option<i32>,
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available_copies: Option<i32>,
    pub price: Option<Decimal>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// Catalog sort keys.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookSortKey {
    #[default]
    Title,
    Author,
    PublishedDate,
    Genre,
}

impl BookSortKey {
    pub fn column(self) -> &'static str {
        match self {
            BookSortKey::Title => "LOWER(title)",
            BookSortKey::Author => "LOWER(author)",
            BookSortKey::PublishedDate => "published_date",
            BookSortKey::Genre => "genre",
        }
    }

    /// Ascending comparison. Titles and authors compare case-insensitively.
    /// Missing values sort after present ones, like NULLs in PostgreSQL.
    pub fn compare(self, a: &Book, b: &Book) -> Ordering {
        match self {
            BookSortKey::Title => compare_ignore_case(&a.title, &b.title),
            BookSortKey::Author => compare_ignore_case(&a.author, &b.author),
            BookSortKey::PublishedDate => nulls_last(&a.published_date, &b.published_date),
            BookSortKey::Genre => nulls_last(&a.genre, &b.genre),
        }
    }
}

pub(crate) fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

pub(crate) fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Query parameters for browsing the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct BookSearch {
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    /// Case-insensitive substring of the author.
    pub author: Option<String>,
    /// Exact genre.
    pub genre: Option<String>,
    /// Case-insensitive substring of the ISBN.
    pub isbn: Option<String>,
    /// `true` keeps books with copies on the shelf, `false` keeps fully lent ones.
    pub available: Option<bool>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<u32>,
    pub sort_by: Option<BookSortKey>,
    pub sort_order: Option<SortOrder>,
}

impl BookSearch {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.page_size)
    }

    pub fn sort_key(&self) -> BookSortKey {
        self.sort_by.unwrap_or_default()
    }

    pub fn order(&self) -> SortOrder {
        self.sort_order.unwrap_or(SortOrder::Asc)
    }

    /// In-process equivalent of the SQL filter. Only active books match.
    pub fn matches(&self, book: &Book) -> bool {
        if !book.is_active() {
            return false;
        }
        if let Some(title) = &self.title {
            if !contains_ignore_case(&book.title, title) {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if !contains_ignore_case(&book.author, author) {
                return false;
            }
        }
        if let Some(genre) = &self.genre {
            if book.genre.as_deref() != Some(genre.as_str()) {
                return false;
            }
        }
        if let Some(isbn) = &self.isbn {
            if !contains_ignore_case(&book.isbn, isbn) {
                return false;
            }
        }
        match self.available {
            Some(true) => book.available_copies > 0,
            Some(false) => book.available_copies == 0,
            None => true,
        }
    }

    /// Full ordering used for pagination: requested key, then id.
    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        self.order()
            .apply(self.sort_key().compare(a, b))
            .then_with(|| a.id.cmp(&b.id))
    }
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn input(isbn: &str, total: i32) -> BookInput {
        BookInput {
            title: "The Rust Programming Language".to_string(),
            author: "Steve Klabnik".to_string(),
            isbn: isbn.to_string(),
            genre: Some("Programming".to_string()),
            publisher: Some("No Starch Press".to_string()),
            published_date: NaiveDate::from_ymd_opt(2018, 8, 6),
            total_copies: total,
            available_copies: None,
            price: Some(Decimal::new(3999, 2)),
            description: None,
            image_url: None,
        }
    }

    pub fn book(id: i32, total: i32, available: i32) -> Book {
        let mut book = NewBook::from_input(input("978-1718500440", total), Utc::now())
            .unwrap()
            .into_book(id);
        book.available_copies = available;
        book
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{book, input};
    use super::*;

    #[test]
    fn test_new_book_defaults_available_to_total() {
        let new_book = NewBook::from_input(input("978-1718500440", 3), Utc::now()).unwrap();
        assert_eq!(new_book.available_copies, 3);
        let book = new_book.into_book(7);
        assert_eq!(book.id, 7);
        assert_eq!(book.state, BookState::Active);
        assert!(book.is_available());
    }

    #[test]
    fn test_new_book_validation() {
        let mut bad = input("978-1718500440", 0);
        assert!(matches!(
            NewBook::from_input(bad.clone(), Utc::now()),
            Err(AppError::ValidationError(_))
        ));

        bad.total_copies = 2;
        bad.available_copies = Some(3);
        assert!(matches!(
            NewBook::from_input(bad.clone(), Utc::now()),
            Err(AppError::ValidationError(_))
        ));

        bad.available_copies = None;
        bad.isbn = "not-an-isbn".to_string();
        assert!(NewBook::from_input(bad.clone(), Utc::now()).is_err());

        bad.isbn = "0-306-40615-2".to_string();
        bad.price = Some(Decimal::new(-1, 0));
        assert!(NewBook::from_input(bad, Utc::now()).is_err());
    }

    #[test]
    fn test_take_copy_and_restock_respect_bounds() {
        let now = Utc::now();
        let mut book = book(1, 1, 1);
        book.take_copy(now).unwrap();
        assert_eq!(book.available_copies, 0);
        assert!(matches!(book.take_copy(now), Err(AppError::Unavailable(_))));
        assert_eq!(book.available_copies, 0);

        assert!(book.restock(now));
        assert_eq!(book.available_copies, 1);
        assert!(!book.restock(now));
        assert_eq!(book.available_copies, 1);
    }

    #[test]
    fn test_retired_book_cannot_be_taken() {
        let now = Utc::now();
        let mut book = book(1, 2, 2);
        book.retire(now);
        assert!(!book.is_available());
        assert!(matches!(book.take_copy(now), Err(AppError::Unavailable(_))));
    }

    #[test]
    fn test_update_shifts_available_with_total() {
        let now = Utc::now();
        let mut book = book(1, 5, 3);
        book.apply(
            BookUpdate {
                total_copies: Some(7),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!((book.total_copies, book.available_copies), (7, 5));

        // two copies are out, so the total cannot drop below two
        let err = book.apply(
            BookUpdate {
                total_copies: Some(1),
                ..Default::default()
            },
            now,
        );
        assert!(matches!(err, Err(AppError::ValidationError(_))));
        assert_eq!((book.total_copies, book.available_copies), (7, 5));
    }

    #[test]
    fn test_search_matches_and_orders() {
        let mut a = book(1, 1, 1);
        a.title = "Zero to Production".into();
        a.author = "Luca Palmieri".into();
        let mut b = book(2, 1, 0);
        b.title = "Programming Rust".into();
        b.genre = None;

        let search = BookSearch {
            title: Some("PROD".into()),
            ..Default::default()
        };
        assert!(search.matches(&a));
        assert!(!search.matches(&b));

        let lent_out = BookSearch {
            available: Some(false),
            ..Default::default()
        };
        assert!(!lent_out.matches(&a));
        assert!(lent_out.matches(&b));

        let by_title = BookSearch::default();
        assert_eq!(by_title.compare(&a, &b), Ordering::Greater);

        let by_genre_desc = BookSearch {
            sort_by: Some(BookSortKey::Genre),
            sort_order: Some(SortOrder::Desc),
            ..Default::default()
        };
        // missing genre sorts last ascending, so first descending
        assert_eq!(by_genre_desc.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_title_sort_ignores_case() {
        let mut lower = book(1, 1, 1);
        lower.title = "abaddon's gate".into();
        let mut upper = book(2, 1, 1);
        upper.title = "Babel".into();

        let by_title = BookSearch::default();
        assert_eq!(by_title.compare(&lower, &upper), Ordering::Less);

        upper.title = "ABADDON'S GATE".into();
        // equal ignoring case, so the id decides
        assert_eq!(by_title.compare(&lower, &upper), Ordering::Less);
        assert_eq!(BookSortKey::Author.column(), "LOWER(author)");
    }
}
