use crate::{
    auth::{self, AuthenticatedUser, LoginRequest, RegisterRequest},
    error::AppError,
    models::ProfileUpdate,
    state::AppState,
};
use actix_web::{get, post, put, web, HttpResponse, Responder};
use chrono::Utc;

/// Register a new user
///
/// Creates a member account and returns an authentication token.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    let response = auth::register(
        state.users.as_ref(),
        &state.auth,
        register_data.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Created().json(response))
}

/// Login user
///
/// Authenticates a user and returns an authentication token.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let response = auth::login(
        state.users.as_ref(),
        &state.auth,
        login_data.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// The caller's own account.
#[get("/profile")]
pub async fn profile(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let account = state
        .users
        .find_user(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(HttpResponse::Ok().json(account))
}

/// Update the caller's profile
///
/// ## Request Body:
/// - `username` (optional): 3-32 characters, alphanumeric, underscores or hyphens.
/// - `full_name` (optional): shown on loan records.
///
/// ## Responses:
/// - `200 OK`: the updated user.
/// - `422 Unprocessable Entity`: a field failed validation.
#[put("/profile")]
pub async fn update_profile(
    state: web::Data<AppState>,
    profile_data: web::Json<ProfileUpdate>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let account =
        auth::update_profile(state.users.as_ref(), user.id, profile_data.into_inner()).await?;
    Ok(HttpResponse::Ok().json(account))
}
