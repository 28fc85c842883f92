pub mod book;
pub mod loan;
pub mod page;
pub mod task;
pub mod user;

pub use book::{Book, BookInput, BookSearch, BookSortKey, BookState, BookUpdate, NewBook};
pub use loan::{
    BorrowRequest, Loan, LoanDetails, LoanRow, LoanSearch, LoanSortKey, LoanStatus, NewLoan,
    ReturnOutcome, ReturnRequest,
};
pub use page::{Page, PageRequest, SortOrder};
pub use task::{Task, TaskInput, TaskPriority, TaskQuery, TaskSort, TaskStatus, TaskUpdate};
pub use user::{NewUser, ProfileUpdate, Role, RoleUpdate, User, UserCredentials};
