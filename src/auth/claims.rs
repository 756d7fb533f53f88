/// JWT Claims structure
///
/// Payload of both token classes: subject, issue/expiry timestamps,
/// issuer, token class and a random token id.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

const JTI_LENGTH: usize = 16;

/// Token class; each class is signed with its own secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Token class
    pub typ: TokenClass,
    /// Random token id, keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// # Arguments
    /// * `user_id` - Subject
    /// * `class` - Access or refresh
    /// * `now` - Issue time (Unix timestamp)
    /// * `ttl_seconds` - Lifetime from `now`
    /// * `issuer` - Issuer identifier
    pub fn new(user_id: Uuid, class: TokenClass, now: i64, ttl_seconds: i64, issuer: &str) -> Self {
        Self {
            sub: user_id.to_string(),
            exp: now + ttl_seconds,
            iat: now,
            iss: issuer.to_string(),
            typ: class,
            jti: generate_jti(),
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }

    /// `now >= exp` counts as expired
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

fn generate_jti() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JTI_LENGTH)
        .map(char::from)
        .collect()
}
