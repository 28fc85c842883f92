#![doc = "The `bookforge` library crate."]
#![doc = ""]
#![doc = "Library lending (catalog, loans, fines) and personal task lists behind a"]
#![doc = "JSON API. Domain models, the lending rules, storage backends, authentication,"]
#![doc = "routing configuration and error handling live here; `main.rs` wires them"]
#![doc = "into an `HttpServer`."]

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use error::{AppError, AppResult};
pub use state::AppState;
