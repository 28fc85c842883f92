//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the application.
//! The lending workflow reports its rejections through dedicated variants
//! (`Unavailable`, `AlreadyBorrowed`, `AlreadyReturned`, `Conflict`) so callers can
//! tell them apart, while infrastructure failures collapse into the generic ones.
//!
//! `AppError` implements `actix_web::error::ResponseError` to seamlessly convert
//! application errors into HTTP responses with a JSON body of the form
//! `{"error": "...", "code": "..."}`.
//! It also provides `From` trait implementations for common error types like `sqlx::Error`,
//! `validator::ValidationErrors`, `jsonwebtoken::errors::Error`, and `bcrypt::BcryptError`,
//! allowing for easy conversion using the `?` operator.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Result alias used by services, stores and handlers.
pub type AppResult<T> = Result<T, AppError>;

/// Represents all possible errors that can occur within the application.
#[derive(Debug)]
pub enum AppError {
    /// Authentication failed or is missing (HTTP 401).
    Unauthorized(String),
    /// The caller is authenticated but lacks the required role (HTTP 403).
    Forbidden(String),
    /// Malformed or otherwise unacceptable request (HTTP 400).
    BadRequest(String),
    /// A requested resource was not found (HTTP 404).
    NotFound(String),
    /// The book is retired or has no copies left on the shelf (HTTP 409).
    Unavailable(String),
    /// The borrower already holds an active loan for this book (HTTP 409).
    AlreadyBorrowed(String),
    /// The loan has already left the active state (HTTP 409).
    AlreadyReturned(String),
    /// A concurrent mutation was detected; nothing was written and the
    /// whole operation may be retried (HTTP 409).
    Conflict(String),
    /// Input failed validation (HTTP 422 Unprocessable Entity).
    ValidationError(String),
    /// Unexpected server-side error (HTTP 500).
    InternalServerError(String),
    /// Error originating from the database (HTTP 500). The message is logged, never returned.
    DatabaseError(String),
}

impl AppError {
    /// Stable machine-readable identifier for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Unavailable(_) => "unavailable",
            AppError::AlreadyBorrowed(_) => "already_borrowed",
            AppError::AlreadyReturned(_) => "already_returned",
            AppError::Conflict(_) => "conflict",
            AppError::ValidationError(_) => "validation_failed",
            AppError::InternalServerError(_) => "internal_error",
            AppError::DatabaseError(_) => "database_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Unavailable(msg)
            | AppError::AlreadyBorrowed(msg)
            | AppError::AlreadyReturned(msg)
            | AppError::Conflict(msg)
            | AppError::ValidationError(msg)
            | AppError::InternalServerError(msg)
            | AppError::DatabaseError(msg) => msg,
        }
    }

    /// Replaces the message of a lending rejection with `message`, keeping the kind.
    ///
    /// Members only get a generic explanation; staff keep the specific one.
    /// Infrastructure errors are returned untouched.
    pub fn with_public_message(self, message: &str) -> AppError {
        let message = message.to_string();
        match self {
            AppError::NotFound(_) => AppError::NotFound(message),
            AppError::Unavailable(_) => AppError::Unavailable(message),
            AppError::AlreadyBorrowed(_) => AppError::AlreadyBorrowed(message),
            AppError::AlreadyReturned(_) => AppError::AlreadyReturned(message),
            AppError::Conflict(_) => AppError::Conflict(message),
            other => other,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            AppError::AlreadyBorrowed(msg) => write!(f, "Already Borrowed: {}", msg),
            AppError::AlreadyReturned(msg) => write!(f, "Already Returned: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts `AppError` variants into `HttpResponse` objects.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_)
            | AppError::AlreadyBorrowed(_)
            | AppError::AlreadyReturned(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::DatabaseError(detail) => {
                log::error!("database error: {}", detail);
                "Database error"
            }
            AppError::InternalServerError(detail) => {
                log::error!("internal error: {}", detail);
                "Internal server error"
            }
            other => other.message(),
        };
        HttpResponse::build(self.status_code()).json(json!({
            "error": message,
            "code": self.code(),
        }))
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// `RowNotFound` becomes `NotFound`. Unique and check violations, serialization
/// failures and deadlocks mean another transaction won a race on the same rows,
/// so they surface as `Conflict`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            sqlx::Error::Database(ref db_err) => match db_err.code().as_deref() {
                Some("23505") | Some("23514") | Some("40001") | Some("40P01") => {
                    log::warn!("concurrent modification rejected: {}", db_err);
                    AppError::Conflict(
                        "The record was modified concurrently, please retry".into(),
                    )
                }
                _ => AppError::DatabaseError(error.to_string()),
            },
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// Converts `jsonwebtoken::errors::Error` into `AppError::Unauthorized`.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::Unauthorized(error.to_string())
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::InternalServerError`.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}
