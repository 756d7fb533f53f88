/// Authentication Guard
///
/// Resolves the principal behind an access token. The principal is handed
/// to handlers explicitly through request extensions.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::claims::TokenClass;
use crate::auth::jwt::TokenCodec;
use crate::error::AuthError;

/// Authenticated identity resolved from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    /// Expiry of the access token that authenticated the request (Unix timestamp)
    pub expires_at: i64,
}

/// Verify `presented` as an access token.
///
/// # Errors
/// - `Unauthenticated` if no token was presented
/// - `InvalidToken` for any codec failure
pub fn authenticate(
    codec: &TokenCodec,
    presented: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Principal, AuthError> {
    let token = presented
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::Unauthenticated)?;

    let claims = codec.verify_claims(token, TokenClass::Access, now)?;

    Ok(Principal {
        user_id: claims.user_id()?,
        expires_at: claims.exp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{AuthSettings, ReusePolicy};
    use crate::error::TokenError;
    use chrono::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(&AuthSettings {
            access_token_secret: "access-secret-key-at-least-32-characters".to_string(),
            refresh_token_secret: "refresh-secret-key-at-least-32-characters".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 864000,
            issuer: "test".to_string(),
            password_hash_cost: 4,
            reuse_policy: ReusePolicy::Reject,
        })
    }

    #[test]
    fn test_valid_access_token_yields_principal() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let token = codec.issue(user_id, TokenClass::Access, now).unwrap();

        let principal = authenticate(&codec, Some(&token), now).expect("should authenticate");

        assert_eq!(principal.user_id, user_id);
        assert_eq!(principal.expires_at, now.timestamp() + 900);
    }

    #[test]
    fn test_missing_token() {
        assert_eq!(authenticate(&codec(), None, Utc::now()), Err(AuthError::Unauthenticated));
        assert_eq!(authenticate(&codec(), Some(""), Utc::now()), Err(AuthError::Unauthenticated));
    }

    #[test]
    fn test_refresh_token_is_rejected() {
        let codec = codec();
        let now = Utc::now();
        let token = codec.issue(Uuid::new_v4(), TokenClass::Refresh, now).unwrap();

        assert_eq!(
            authenticate(&codec, Some(&token), now),
            Err(AuthError::InvalidToken(TokenError::WrongClass))
        );
    }

    #[test]
    fn test_expired_access_token_is_rejected() {
        let codec = codec();
        let issued = Utc::now();
        let token = codec.issue(Uuid::new_v4(), TokenClass::Access, issued).unwrap();

        assert_eq!(
            authenticate(&codec, Some(&token), issued + Duration::seconds(901)),
            Err(AuthError::InvalidToken(TokenError::Expired))
        );
    }
}
