//! Read side of the loan ledger. Rows are turned into [`LoanDetails`] at
//! the time of the call so overdue flags are never stale.

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{LoanDetails, LoanSearch, Page};
use crate::store::LibraryStore;

pub async fn get_loan(
    store: &dyn LibraryStore,
    loan_id: i32,
    now: DateTime<Utc>,
) -> AppResult<LoanDetails> {
    store
        .find_loan(loan_id)
        .await?
        .map(|row| LoanDetails::from_row(row, now))
        .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan_id)))
}

pub async fn search_loans(
    store: &dyn LibraryStore,
    search: &LoanSearch,
    now: DateTime<Utc>,
) -> AppResult<Page<LoanDetails>> {
    search.validate()?;
    let page = store.search_loans(search, now).await?;
    Ok(Page {
        items: page
            .items
            .into_iter()
            .map(|row| LoanDetails::from_row(row, now))
            .collect(),
        total_count: page.total_count,
        page: page.page,
        page_size: page.page_size,
        total_pages: page.total_pages,
    })
}

pub async fn borrower_loans(
    store: &dyn LibraryStore,
    borrower_id: i32,
    now: DateTime<Utc>,
) -> AppResult<Vec<LoanDetails>> {
    let rows = store.borrower_loans(borrower_id).await?;
    Ok(rows.into_iter().map(|row| LoanDetails::from_row(row, now)).collect())
}

pub async fn overdue_loans(
    store: &dyn LibraryStore,
    now: DateTime<Utc>,
) -> AppResult<Vec<LoanDetails>> {
    let rows = store.overdue_loans(now).await?;
    Ok(rows.into_iter().map(|row| LoanDetails::from_row(row, now)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::fixtures;
    use crate::models::{BorrowRequest, LoanSortKey, NewBook, SortOrder};
    use crate::services::circulation::{borrow_book, CirculationPolicy};
    use crate::store::MemoryStore;
    use chrono::Duration;

    async fn seed_loans(store: &MemoryStore) -> (i32, i32) {
        let mut uow = store.begin().await.unwrap();
        let a = uow
            .insert_book(NewBook::from_input(fixtures::input("978-0000000101", 2), Utc::now()).unwrap())
            .await
            .unwrap();
        let b = uow
            .insert_book(NewBook::from_input(fixtures::input("978-0000000102", 2), Utc::now()).unwrap())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let policy = CirculationPolicy::default();
        let request = |book_id| BorrowRequest {
            book_id,
            due_date: None,
            notes: None,
        };
        let old = Utc::now() - Duration::days(30);
        let late = borrow_book(store, &policy, 1, request(a.id), old).await.unwrap();
        let fresh = borrow_book(store, &policy, 1, request(b.id), Utc::now()).await.unwrap();
        (late.id, fresh.id)
    }

    #[actix_rt::test]
    async fn test_overdue_queries() {
        let store = MemoryStore::new();
        let (late, fresh) = seed_loans(&store).await;
        let now = Utc::now();

        let overdue = overdue_loans(&store, now).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].loan.id, late);
        assert!(overdue[0].is_overdue);
        assert_eq!(overdue[0].days_overdue, 16);

        let on_time = search_loans(
            &store,
            &LoanSearch {
                overdue: Some(false),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();
        assert_eq!(on_time.total_count, 1);
        assert_eq!(on_time.items[0].loan.id, fresh);
    }

    #[actix_rt::test]
    async fn test_listing_order() {
        let store = MemoryStore::new();
        let (late, fresh) = seed_loans(&store).await;
        let now = Utc::now();

        let mine = borrower_loans(&store, 1, now).await.unwrap();
        let ids: Vec<i32> = mine.iter().map(|d| d.loan.id).collect();
        assert_eq!(ids, vec![fresh, late]);

        let by_due = search_loans(
            &store,
            &LoanSearch {
                sort_by: Some(LoanSortKey::DueDate),
                sort_order: Some(SortOrder::Asc),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();
        let ids: Vec<i32> = by_due.items.iter().map(|d| d.loan.id).collect();
        assert_eq!(ids, vec![late, fresh]);

        assert!(matches!(
            get_loan(&store, 404, now).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(get_loan(&store, late, now).await.unwrap().book_title, "The Rust Programming Language");
    }
}
