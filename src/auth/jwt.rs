/// JWT Token Codec
///
/// Issues and verifies signed, expiring tokens for both token classes.
/// Access and refresh tokens are signed with distinct HS256 secrets so that
/// leaking one secret does not let an attacker forge the other class.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenClass};
use crate::configuration::AuthSettings;
use crate::error::{AppError, TokenError};

struct ClassKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl ClassKeys {
    fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }
}

/// Signs and verifies access and refresh tokens
pub struct TokenCodec {
    access: ClassKeys,
    refresh: ClassKeys,
    issuer: String,
}

impl TokenCodec {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            access: ClassKeys::new(&settings.access_token_secret, settings.access_token_expiry),
            refresh: ClassKeys::new(&settings.refresh_token_secret, settings.refresh_token_expiry),
            issuer: settings.issuer.clone(),
        }
    }

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    /// Lifetime of a token of `class`, in seconds
    pub fn ttl(&self, class: TokenClass) -> i64 {
        self.keys(class).ttl_seconds
    }

    /// Mint a token for `user_id` expiring at `now + ttl(class)`
    ///
    /// # Errors
    /// Returns error if token encoding fails
    pub fn issue(
        &self,
        user_id: Uuid,
        class: TokenClass,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let keys = self.keys(class);
        let claims = Claims::new(user_id, class, now.timestamp(), keys.ttl_seconds, &self.issuer);

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify a token of `expected` class and return its subject
    pub fn verify(
        &self,
        token: &str,
        expected: TokenClass,
        now: DateTime<Utc>,
    ) -> Result<Uuid, TokenError> {
        self.verify_claims(token, expected, now)?.user_id()
    }

    /// Verify a token of `expected` class and return its claims
    ///
    /// Checks run in a fixed order: decodable, class, signature, expiry.
    /// The class is read before the signature so a token of the other class
    /// reports `WrongClass` rather than a signature failure.
    pub fn verify_claims(
        &self,
        token: &str,
        expected: TokenClass,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let unverified = peek_claims(token)?;
        if unverified.typ != expected {
            return Err(TokenError::WrongClass);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock below
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.keys(expected).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidIssuer => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })?;

        if claims.is_expired_at(now.timestamp()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

/// Decode the payload without checking the signature.
fn peek_claims(token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|_| TokenError::Malformed)
}
