/// Credential Store
///
/// Persistence boundary for user identities. The session layer only needs
/// lookups plus atomic updates of the single current refresh token held for
/// each user; everything else about users lives elsewhere.

mod memory;
mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;

/// A user as the credential store sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    /// SHA-256 digest of the current refresh token, if any
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
}

/// Result of a conditional refresh-token update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Swapped,
    /// The stored value no longer matched what the caller expected
    Conflict,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Look a user up by username or email
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Replace the stored refresh-token digest with `new` only if it still
    /// equals `expected` (`None` meaning "no token stored").
    async fn compare_and_set_refresh_token(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<SwapOutcome, StoreError>;

    /// Install `new` as the refresh-token digest, replacing whatever is
    /// stored, but only while the user's credential hash still equals
    /// `password_hash`. A `Conflict` means the credential was rotated (or the
    /// user removed) after it was checked.
    async fn set_refresh_token_if_credential(
        &self,
        user_id: Uuid,
        password_hash: &str,
        new: &str,
    ) -> Result<SwapOutcome, StoreError>;

    /// Unconditionally drop the stored refresh token. Clearing an already
    /// empty slot, or an unknown user, is not an error.
    async fn clear_refresh_token(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Insert a user; fails with `Duplicate` if username or email is taken
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// Store a new credential hash and clear the refresh token in one update
    async fn update_credential(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError>;
}

/// Digest kept in the store instead of the refresh token itself
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
