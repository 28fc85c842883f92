#![allow(dead_code)]

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;

use bookforge::auth::{AuthMiddleware, AuthResponse, AuthSettings};
use bookforge::models::Role;
use bookforge::routes::{self, health};
use bookforge::services::CirculationPolicy;
use bookforge::store::{MemoryStore, UserStore};
use bookforge::AppState;

pub const PASSWORD: &str = "Password123!";

// Helper struct to hold auth details
pub struct TestUser {
    pub id: i32,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> (header::HeaderName, String) {
        (header::AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

pub fn test_settings() -> AuthSettings {
    AuthSettings {
        // bcrypt's minimum cost keeps the tests fast
        bcrypt_cost: 4,
        ..AuthSettings::new("integration-test-secret")
    }
}

pub fn test_state() -> (web::Data<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), test_settings(), CirculationPolicy::default());
    (web::Data::new(state), store)
}

pub async fn init_app(
    state: web::Data<AppState>,
) -> impl Service<
    actix_http::Request,
    Response = ServiceResponse<impl MessageBody>,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(state)
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            ),
    )
    .await
}

pub async fn register_user(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    username: &str,
) -> TestUser {
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&json!({
            "username": username,
            "full_name": format!("{} Test", username),
            "email": format!("{}@library.test", username),
            "password": PASSWORD
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    assert!(
        status.is_success(),
        "Failed to register {}. Status: {}. Body: {}",
        username,
        status,
        String::from_utf8_lossy(&body)
    );
    let auth: AuthResponse =
        serde_json::from_slice(&body).expect("Failed to parse registration response");
    TestUser {
        id: auth.user_id,
        token: auth.token,
    }
}

pub async fn login_user(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    username: &str,
) -> TestUser {
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(&json!({
            "email": format!("{}@library.test", username),
            "password": PASSWORD
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert!(resp.status().is_success(), "Login of {} failed", username);
    let auth: AuthResponse = test::read_body_json(resp).await;
    TestUser {
        id: auth.user_id,
        token: auth.token,
    }
}

/// Registers `username`, gives it `role` and logs in again so the token
/// carries the new role.
pub async fn user_with_role(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    store: &MemoryStore,
    username: &str,
    role: Role,
) -> TestUser {
    let user = register_user(app, username).await;
    store
        .set_role(user.id, role)
        .await
        .expect("set_role failed")
        .expect("user vanished");
    login_user(app, username).await
}

pub async fn create_book(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    librarian: &TestUser,
    isbn: &str,
    total_copies: i32,
) -> Value {
    let req = test::TestRequest::post()
        .uri("/api/books")
        .append_header(librarian.bearer())
        .set_json(&json!({
            "title": format!("Book {}", isbn),
            "author": "Ursula K. Le Guin",
            "isbn": isbn,
            "genre": "Fantasy",
            "total_copies": total_copies
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    assert_eq!(
        status,
        actix_web::http::StatusCode::CREATED,
        "Create book failed. Body: {:?}",
        String::from_utf8_lossy(&body)
    );
    serde_json::from_slice(&body).expect("Failed to parse book")
}

/// Sends the request and returns status and JSON body.
pub async fn send(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    req: actix_http::Request,
) -> (actix_web::http::StatusCode, Value) {
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body).into_owned())
        })
    };
    (status, json)
}
