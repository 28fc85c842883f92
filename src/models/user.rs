use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Access level of an account.
/// Corresponds to the `user_role` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can browse, borrow for themselves and see their own loans.
    Member,
    /// Manages the catalog and processes returns.
    Librarian,
    /// Librarian rights plus role management.
    Admin,
}

impl Role {
    /// Librarians and admins run the front desk.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }
}

/// A registered account, safe to serialize.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A user row including the password hash; never leaves the server.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

/// An account about to be stored.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Body of `PUT /api/auth/profile`. Absent fields are left untouched; the
/// email and role cannot be changed here.
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct ProfileUpdate {
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "crate::auth::USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: Option<String>,
    /// Name shown on loan records.
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
}

/// Body of `PUT /api/users/{id}/role`.
#[derive(Debug, Deserialize, Serialize)]
pub struct RoleUpdate {
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_roles() {
        assert!(!Role::Member.is_staff());
        assert!(Role::Librarian.is_staff());
        assert!(Role::Admin.is_staff());
    }

    #[test]
    fn test_profile_update_validation() {
        assert!(ProfileUpdate::default().validate().is_ok());
        let renamed = ProfileUpdate {
            username: Some("night_owl".into()),
            full_name: Some("Night Owl".into()),
        };
        assert!(renamed.validate().is_ok());
        let bad_username = ProfileUpdate {
            username: Some("night owl!".into()),
            ..Default::default()
        };
        assert!(bad_username.validate().is_err());
        let blank_name = ProfileUpdate {
            full_name: Some(String::new()),
            ..Default::default()
        };
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Librarian).unwrap(), "\"librarian\"");
        let update: RoleUpdate = serde_json::from_str(r#"{"role":"admin"}"#).unwrap();
        assert_eq!(update.role, Role::Admin);
    }
}
