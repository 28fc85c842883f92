use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::AuthSettings;
use crate::error::AppError;
use crate::models::Role;

/// Represents the claims encoded within a JWT (JSON Web Token).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject of the token: the user's id.
    pub sub: i32,
    /// Role at the time the token was issued.
    pub role: Role,
    /// Expiration timestamp (seconds since epoch) for the token.
    pub exp: usize,
}

/// Signs an HS256 token for `user_id` valid for `settings.token_ttl_hours`.
///
/// Returns the token together with its expiry.
pub fn generate_token(
    settings: &AuthSettings,
    user_id: i32,
    role: Role,
    now: DateTime<Utc>,
) -> Result<(String, DateTime<Utc>), AppError> {
    let expires_at = now
        .checked_add_signed(Duration::hours(settings.token_ttl_hours))
        .ok_or_else(|| AppError::InternalServerError("Token expiry out of range".into()))?;

    let claims = Claims {
        sub: user_id,
        role,
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))?;
    Ok((token, expires_at))
}

/// Verifies a JWT string and decodes its claims.
///
/// Signature and expiry are checked. Any failure is `AppError::Unauthorized`.
pub fn verify_token(settings: &AuthSettings, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {:?}", e.kind())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation_and_verification() {
        let settings = AuthSettings::new("test_secret_for_gen_verify");
        let now = Utc::now();
        let (token, expires_at) = generate_token(&settings, 1, Role::Librarian, now).unwrap();
        assert_eq!(expires_at, now + Duration::hours(24));

        let claims = verify_token(&settings, &token).unwrap();
        assert_eq!(claims.sub, 1);
        assert_eq!(claims.role, Role::Librarian);
    }

    #[test]
    fn test_token_expiration() {
        let settings = AuthSettings::new("test_secret_for_expiration");
        let issued = Utc::now() - Duration::hours(26);
        let (expired_token, _) = generate_token(&settings, 2, Role::Member, issued).unwrap();

        match verify_token(&settings, &expired_token) {
            Err(AppError::Unauthorized(msg)) => {
                assert!(msg.contains("ExpiredSignature"), "unexpected message: {}", msg);
            }
            Ok(_) => panic!("Token should have been invalid due to expiration"),
            Err(e) => panic!("Unexpected error type for expired token: {:?}", e),
        }
    }

    #[test]
    fn test_invalid_token_signature() {
        let signer = AuthSettings::new("the_secret_it_was_signed_with");
        let verifier = AuthSettings::new("a_completely_different_secret");
        let (token, _) = generate_token(&signer, 3, Role::Admin, Utc::now()).unwrap();

        match verify_token(&verifier, &token) {
            Err(AppError::Unauthorized(msg)) => assert!(msg.contains("InvalidSignature")),
            Ok(_) => panic!("Token should have been invalid due to signature mismatch"),
            Err(e) => panic!("Unexpected error type for invalid signature: {:?}", e),
        }
    }

    #[test]
    fn test_garbage_is_unauthorized() {
        let settings = AuthSettings::new("secret");
        assert!(matches!(
            verify_token(&settings, "not.a.jwt"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
