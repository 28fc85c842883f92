pub mod auth;
pub mod books;
pub mod health;
pub mod loans;
pub mod tasks;
pub mod users;

use actix_web::web;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::login)
            .service(auth::register)
            .service(auth::profile)
            .service(auth::update_profile),
    )
    .service(web::scope("/users").service(users::update_role))
    .service(
        web::scope("/books")
            .service(books::search_books)
            .service(books::available_books)
            .service(books::genres)
            .service(books::create_book)
            .service(books::get_book)
            .service(books::availability)
            .service(books::update_book)
            .service(books::retire_book),
    )
    .service(
        web::scope("/loans")
            .service(loans::borrow)
            .service(loans::return_loan)
            .service(loans::search_loans)
            .service(loans::my_loans)
            .service(loans::overdue_loans)
            .service(loans::get_loan)
            .service(loans::loan_fine),
    )
    .service(
        web::scope("/tasks")
            .service(tasks::get_tasks)
            .service(tasks::create_task)
            .service(tasks::get_task)
            .service(tasks::update_task)
            .service(tasks::delete_task),
    );
}
