mod common;

use actix_web::{http::StatusCode, test};
use serde_json::json;

use bookforge::auth::{bootstrap_admin, AuthResponse};
use bookforge::config::AdminBootstrap;
use bookforge::models::Role;
use common::{init_app, send, test_settings, test_state, PASSWORD};

#[actix_rt::test]
async fn test_register_and_login_flow() {
    let (state, _store) = test_state();
    let app = init_app(state).await;

    // Register a new user
    let register_payload = json!({
        "username": "integration_user",
        "full_name": "Integration User",
        "email": "integration@example.com",
        "password": PASSWORD
    });
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body_bytes = test::read_body(resp).await;
    assert_eq!(
        status,
        StatusCode::CREATED,
        "Registration failed. Body: {:?}",
        String::from_utf8_lossy(&body_bytes)
    );
    let registered: AuthResponse = serde_json::from_slice(&body_bytes).unwrap();
    assert_eq!(registered.role, Role::Member);

    // Try to register the same user again (should fail)
    let req_conflict = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_payload)
        .to_request();
    let (status_conflict, body_conflict) = send(&app, req_conflict).await;
    assert_eq!(
        status_conflict,
        StatusCode::BAD_REQUEST,
        "Duplicate registration did not fail as expected. Body: {}",
        body_conflict
    );

    // Login with the registered user
    let req_login = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(&json!({
            "email": "integration@example.com",
            "password": PASSWORD
        }))
        .to_request();
    let resp_login = test::call_service(&app, req_login).await;
    assert_eq!(resp_login.status(), StatusCode::OK, "Login failed");
    let login_response: AuthResponse = test::read_body_json(resp_login).await;

    assert!(!login_response.token.is_empty(), "Token should be a non-empty string");
    assert_eq!(login_response.user_id, registered.user_id);
    assert!(login_response.expires_at > chrono::Utc::now());

    // Use the token to access a protected route
    let req_profile = test::TestRequest::get()
        .uri("/api/auth/profile")
        .append_header(("Authorization", format!("Bearer {}", login_response.token)))
        .to_request();
    let (status, profile) = send(&app, req_profile).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], registered.user_id);
    assert_eq!(profile["full_name"], "Integration User");
    assert_eq!(profile["role"], "member");
}

#[actix_rt::test]
async fn test_invalid_registration_inputs() {
    let (state, _store) = test_state();
    let app = init_app(state).await;

    let test_cases = vec![
        // Deserialization errors (expect 400 for missing fields)
        (
            json!({ "full_name": "T", "email": "test@example.com", "password": PASSWORD }),
            StatusCode::BAD_REQUEST,
            "missing username",
        ),
        (
            json!({ "username": "testuser", "full_name": "T", "password": PASSWORD }),
            StatusCode::BAD_REQUEST,
            "missing email",
        ),
        (
            json!({ "username": "testuser", "full_name": "T", "email": "test@example.com" }),
            StatusCode::BAD_REQUEST,
            "missing password",
        ),
        // Validation errors (expect 422 for invalid formats/lengths after successful deserialization)
        (
            json!({ "username": "testuser", "full_name": "T", "email": "invalid-email", "password": PASSWORD }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid email format",
        ),
        (
            json!({ "username": "u", "full_name": "T", "email": "test@example.com", "password": PASSWORD }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "username too short",
        ),
        (
            json!({ "username": "a".repeat(33), "full_name": "T", "email": "test@example.com", "password": PASSWORD }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "username too long",
        ),
        (
            json!({ "username": "user name!", "full_name": "T", "email": "test@example.com", "password": PASSWORD }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "username with invalid chars",
        ),
        (
            json!({ "username": "testuser", "full_name": "", "email": "test@example.com", "password": PASSWORD }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "empty full name",
        ),
        (
            json!({ "username": "testuser", "full_name": "T", "email": "test@example.com", "password": "123" }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "password too short",
        ),
    ];

    for (payload, expected_status, description) in test_cases {
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(&payload)
            .to_request();

        let (status, body) = send(&app, req).await;
        assert_eq!(
            status, expected_status,
            "Test case failed: {}. Expected {}, got {}. Body: {}",
            description, expected_status, status, body
        );
    }
}

#[actix_rt::test]
async fn test_invalid_login_inputs() {
    let (state, _store) = test_state();
    let app = init_app(state).await;
    common::register_user(&app, "login_test_user").await;
    let valid_user_email = "login_test_user@library.test";

    let test_cases = vec![
        (
            json!({ "password": PASSWORD }),
            StatusCode::BAD_REQUEST,
            "missing email",
        ),
        (
            json!({ "email": valid_user_email }),
            StatusCode::BAD_REQUEST,
            "missing password",
        ),
        (
            json!({ "email": "invalid-email", "password": PASSWORD }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid email format",
        ),
        (
            json!({ "email": valid_user_email, "password": "123" }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "password too short",
        ),
        (
            json!({ "email": valid_user_email, "password": "WrongPassword123!" }),
            StatusCode::UNAUTHORIZED,
            "incorrect password",
        ),
        (
            json!({ "email": "nonexistent@example.com", "password": PASSWORD }),
            StatusCode::UNAUTHORIZED,
            "non-existent user",
        ),
    ];

    for (payload, expected_status, description) in test_cases {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(&payload)
            .to_request();

        let (status, body) = send(&app, req).await;
        assert_eq!(
            status, expected_status,
            "Test case failed: {}. Expected {}, got {}. Body: {}",
            description, expected_status, status, body
        );
    }
}

#[actix_rt::test]
async fn test_bootstrapped_admin_can_log_in() {
    let (state, store) = test_state();
    let admin = AdminBootstrap {
        email: "root@library.test".into(),
        password: PASSWORD.into(),
    };
    bootstrap_admin(store.as_ref(), &test_settings(), &admin)
        .await
        .unwrap();
    let app = init_app(state).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(&json!({ "email": "root@library.test", "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let auth: AuthResponse = test::read_body_json(resp).await;
    assert_eq!(auth.role, Role::Admin);
}

#[actix_rt::test]
async fn test_update_profile() {
    let (state, _store) = test_state();
    let app = init_app(state).await;
    let reader = common::register_user(&app, "profile_user").await;

    let req = test::TestRequest::put()
        .uri("/api/auth/profile")
        .append_header(reader.bearer())
        .set_json(&json!({ "full_name": "Renamed Reader", "username": "renamed_reader" }))
        .to_request();
    let (status, updated) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "Profile update failed. Body: {}", updated);
    assert_eq!(updated["id"], reader.id);
    assert_eq!(updated["full_name"], "Renamed Reader");
    assert_eq!(updated["username"], "renamed_reader");
    assert_eq!(updated["email"], "profile_user@library.test");
    assert_eq!(updated["role"], "member");

    // the email is not part of the profile and stays the login key
    let req = test::TestRequest::put()
        .uri("/api/auth/profile")
        .append_header(reader.bearer())
        .set_json(&json!({ "email": "elsewhere@library.test" }))
        .to_request();
    let (status, unchanged) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unchanged["email"], "profile_user@library.test");
    common::login_user(&app, "profile_user").await;

    let invalid_cases = vec![
        (json!({ "username": "x" }), "username too short"),
        (json!({ "username": "has space" }), "username with invalid chars"),
        (json!({ "full_name": "" }), "empty full name"),
    ];
    for (payload, description) in invalid_cases {
        let req = test::TestRequest::put()
            .uri("/api/auth/profile")
            .append_header(reader.bearer())
            .set_json(&payload)
            .to_request();
        let (status, body) = send(&app, req).await;
        assert_eq!(
            status,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Test case failed: {}. Body: {}",
            description,
            body
        );
    }

    let req = test::TestRequest::get()
        .uri("/api/auth/profile")
        .append_header(reader.bearer())
        .to_request();
    let (status, profile) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["full_name"], "Renamed Reader");

    // no token, no update
    let req = test::TestRequest::put()
        .uri("/api/auth/profile")
        .set_json(&json!({ "full_name": "Anonymous" }))
        .to_request();
    let err = test::try_call_service(&app, req)
        .await
        .err()
        .expect("missing token should be rejected");
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
}

