//! Registration, login and the startup admin account.

use chrono::{DateTime, Utc};
use log::{info, warn};
use validator::Validate;

use crate::auth::{
    generate_token, hash_password, verify_password, AuthResponse, AuthSettings, LoginRequest,
    RegisterRequest,
};
use crate::config::AdminBootstrap;
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, ProfileUpdate, Role, User};
use crate::store::UserStore;

fn issue(settings: &AuthSettings, user: &User, now: DateTime<Utc>) -> AppResult<AuthResponse> {
    let (token, expires_at) = generate_token(settings, user.id, user.role, now)?;
    Ok(AuthResponse {
        token,
        user_id: user.id,
        role: user.role,
        expires_at,
    })
}

/// Creates a member account and signs it in.
pub async fn register(
    users: &dyn UserStore,
    settings: &AuthSettings,
    request: RegisterRequest,
    now: DateTime<Utc>,
) -> AppResult<AuthResponse> {
    request.validate()?;
    let password_hash = hash_password(&request.password, settings.bcrypt_cost)?;
    let user = users
        .insert_user(NewUser {
            username: request.username,
            full_name: request.full_name,
            email: request.email,
            password_hash,
            role: Role::Member,
        })
        .await?;
    info!("Registered user {} ({})", user.id, user.username);
    issue(settings, &user, now)
}

pub async fn login(
    users: &dyn UserStore,
    settings: &AuthSettings,
    request: LoginRequest,
    now: DateTime<Utc>,
) -> AppResult<AuthResponse> {
    request.validate()?;
    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let credentials = users
        .find_credentials(&request.email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&request.password, &credentials.password_hash)? {
        warn!("Failed login for user {}", credentials.user.id);
        return Err(invalid());
    }
    issue(settings, &credentials.user, now)
}

/// Changes the caller's display name or username. The role is untouched,
/// so an existing token stays valid.
pub async fn update_profile(
    users: &dyn UserStore,
    user_id: i32,
    update: ProfileUpdate,
) -> AppResult<User> {
    update.validate()?;
    let user = users
        .update_profile(user_id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!("User {} updated their profile", user.id);
    Ok(user)
}

/// Makes sure the configured administrator exists and holds the admin role.
/// An existing account keeps its password.
pub async fn bootstrap_admin(
    users: &dyn UserStore,
    settings: &AuthSettings,
    admin: &AdminBootstrap,
) -> AppResult<User> {
    if let Some(existing) = users.find_credentials(&admin.email).await? {
        if existing.user.role == Role::Admin {
            return Ok(existing.user);
        }
        let promoted = users
            .set_role(existing.user.id, Role::Admin)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", existing.user.id)))?;
        info!("Promoted {} to admin", promoted.email);
        return Ok(promoted);
    }

    let username = admin
        .email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("admin")
        .to_string();
    let user = users
        .insert_user(NewUser {
            username,
            full_name: "Administrator".to_string(),
            email: admin.email.clone(),
            password_hash: hash_password(&admin.password, settings.bcrypt_cost)?,
            role: Role::Admin,
        })
        .await?;
    info!("Created admin account {}", user.email);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn settings() -> AuthSettings {
        AuthSettings {
            bcrypt_cost: 4,
            ..AuthSettings::new("accounts-test-secret")
        }
    }

    fn registration(email: &str) -> RegisterRequest {
        RegisterRequest {
            username: "reader".into(),
            full_name: "Avid Reader".into(),
            email: email.into(),
            password: "hunter22".into(),
        }
    }

    #[actix_rt::test]
    async fn test_register_then_login() {
        let store = MemoryStore::new();
        let settings = settings();
        let now = Utc::now();

        let registered = register(&store, &settings, registration("reader@library.test"), now)
            .await
            .unwrap();
        assert_eq!(registered.role, Role::Member);

        let duplicate = register(&store, &settings, registration("reader@library.test"), now).await;
        assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

        let logged_in = login(
            &store,
            &settings,
            LoginRequest {
                email: "reader@library.test".into(),
                password: "hunter22".into(),
            },
            now,
        )
        .await
        .unwrap();
        assert_eq!(logged_in.user_id, registered.user_id);

        let wrong = login(
            &store,
            &settings,
            LoginRequest {
                email: "reader@library.test".into(),
                password: "hunter23".into(),
            },
            now,
        )
        .await;
        assert!(matches!(wrong, Err(AppError::Unauthorized(_))));

        let unknown = login(
            &store,
            &settings,
            LoginRequest {
                email: "nobody@library.test".into(),
                password: "hunter22".into(),
            },
            now,
        )
        .await;
        assert!(matches!(unknown, Err(AppError::Unauthorized(_))));
    }

    #[actix_rt::test]
    async fn test_bootstrap_admin_is_idempotent() {
        let store = MemoryStore::new();
        let settings = settings();
        let admin = AdminBootstrap {
            email: "head@library.test".into(),
            password: "shelves!".into(),
        };

        let first = bootstrap_admin(&store, &settings, &admin).await.unwrap();
        assert_eq!(first.role, Role::Admin);
        assert_eq!(first.username, "head");
        let second = bootstrap_admin(&store, &settings, &admin).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[actix_rt::test]
    async fn test_bootstrap_promotes_existing_member() {
        let store = MemoryStore::new();
        let settings = settings();
        let member = register(&store, &settings, registration("boss@library.test"), Utc::now())
            .await
            .unwrap();

        let admin = AdminBootstrap {
            email: "boss@library.test".into(),
            password: "ignored".into(),
        };
        let promoted = bootstrap_admin(&store, &settings, &admin).await.unwrap();
        assert_eq!(promoted.id, member.user_id);
        assert_eq!(promoted.role, Role::Admin);
    }

    #[actix_rt::test]
    async fn test_update_profile_changes_only_given_fields() {
        let store = MemoryStore::new();
        let settings = settings();
        let member = register(&store, &settings, registration("owl@library.test"), Utc::now())
            .await
            .unwrap();

        let renamed = update_profile(
            &store,
            member.user_id,
            ProfileUpdate {
                full_name: Some("Night Owl".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.full_name, "Night Owl");
        assert_eq!(renamed.username, "reader");
        assert_eq!(renamed.email, "owl@library.test");
        assert_eq!(renamed.role, Role::Member);

        let invalid = update_profile(
            &store,
            member.user_id,
            ProfileUpdate {
                username: Some("no spaces allowed".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(invalid, Err(AppError::ValidationError(_))));
        assert_eq!(
            store.find_user(member.user_id).await.unwrap().unwrap().username,
            "reader"
        );

        let missing = update_profile(&store, 999, ProfileUpdate::default()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
