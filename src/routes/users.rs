use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::RoleUpdate,
    state::AppState,
};
use actix_web::{put, web, HttpResponse, Responder};
use log::info;

/// Changes a user's role. Admin only.
///
/// The new role is carried by tokens issued from the next login on.
#[put("/{id}/role")]
pub async fn update_role(
    state: web::Data<AppState>,
    user_id: web::Path<i32>,
    update: web::Json<RoleUpdate>,
    caller: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    caller.require_admin()?;
    let user_id = user_id.into_inner();

    let updated = state
        .users
        .set_role(user_id, update.role)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    info!("User {} set role of user {} to {:?}", caller.id, updated.id, updated.role);
    Ok(HttpResponse::Ok().json(updated))
}
