/// Session Manager
///
/// Login, refresh-token rotation and logout on top of a credential store.
/// Each user has at most one current refresh token: the one whose digest the
/// store holds. Login overwrites it as long as the checked credential is
/// still current; refresh replaces it through the store's compare-and-set,
/// so a superseded token can never be used again.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog};
use crate::auth::claims::TokenClass;
use crate::auth::guard::Principal;
use crate::auth::jwt::TokenCodec;
use crate::auth::password::PasswordHasher;
use crate::configuration::{AuthSettings, ReusePolicy};
use crate::error::{AppError, AuthError, TokenError, ValidationError};
use crate::store::{digest_token, CredentialStore, NewUser, SwapOutcome, UserRecord};
use crate::validators::{is_valid_email, is_valid_name, is_valid_username};

/// Access and refresh token minted together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Fields accepted at registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    reuse_policy: ReusePolicy,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, settings: &AuthSettings) -> Self {
        Self {
            store,
            codec: TokenCodec::new(settings),
            hasher: PasswordHasher::new(settings.password_hash_cost),
            reuse_policy: settings.reuse_policy,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Access token lifetime in seconds
    pub fn access_token_ttl(&self) -> i64 {
        self.codec.ttl(TokenClass::Access)
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_token_ttl(&self) -> i64 {
        self.codec.ttl(TokenClass::Refresh)
    }

    /// Create an account. No tokens are issued; the user logs in afterwards.
    ///
    /// # Errors
    /// - `Validation` for empty or malformed fields and weak passwords
    /// - `Store(Duplicate)` if the username or email is taken
    pub async fn register(&self, registration: Registration) -> Result<UserRecord, AppError> {
        let full_name = is_valid_name(&registration.full_name)?;
        let username = is_valid_username(&registration.username)?;
        let email = is_valid_email(&registration.email)?.to_lowercase();
        let password_hash = self.hasher.hash_password(&registration.password)?;

        let user = self
            .store
            .create_user(NewUser {
                username,
                email,
                full_name,
                password_hash,
            })
            .await?;

        AuditLog::success(AuditAction::Register, user.id).emit();
        Ok(user)
    }

    /// Verify a credential and open a session.
    ///
    /// `identifier` is a username or email, matched case-insensitively.
    /// Overwrites any stored refresh token, which ends every other session
    /// of the user.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(UserRecord, TokenPair), AppError> {
        let identifier = identifier.trim().to_lowercase();
        if identifier.is_empty() {
            return Err(ValidationError::EmptyField("username or email".to_string()).into());
        }

        let user = match self.store.find_by_identifier(&identifier).await? {
            Some(user) => user,
            None => {
                AuditLog::failure(AuditAction::Login, None, AuthError::NotFound.to_string()).emit();
                return Err(AuthError::NotFound.into());
            }
        };

        if !self.hasher.verify_password(password, &user.password_hash) {
            AuditLog::failure(
                AuditAction::Login,
                Some(user.id),
                AuthError::InvalidCredential.to_string(),
            )
            .emit();
            return Err(AuthError::InvalidCredential.into());
        }

        let pair = self.issue_pair(user.id)?;
        let new_digest = digest_token(&pair.refresh_token);

        match self
            .store
            .set_refresh_token_if_credential(user.id, &user.password_hash, &new_digest)
            .await?
        {
            SwapOutcome::Swapped => {}
            SwapOutcome::Conflict => {
                // The password was changed after we verified it
                AuditLog::failure(
                    AuditAction::Login,
                    Some(user.id),
                    "credential rotated during login",
                )
                .emit();
                return Err(AuthError::InvalidCredential.into());
            }
        }

        AuditLog::success(AuditAction::Login, user.id).emit();

        let user = UserRecord {
            refresh_token_hash: Some(new_digest),
            ..user
        };
        Ok((user, pair))
    }

    /// Rotate a refresh token into a fresh token pair.
    ///
    /// # Errors
    /// - `Unauthenticated` if no token was presented
    /// - `InvalidToken` if the token does not verify, or its user is gone,
    ///   or the user has no session
    /// - `TokenReused` if the token verifies but is not the current one.
    ///   A token that loses a concurrent refresh counts as reused too, so the
    ///   reuse policy applies however the two requests interleave.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair, AppError> {
        let presented = match presented.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return Err(AuthError::Unauthenticated.into()),
        };

        let user_id = match self.codec.verify(presented, TokenClass::Refresh, Utc::now()) {
            Ok(user_id) => user_id,
            Err(e) => {
                AuditLog::failure(AuditAction::Refresh, None, e.to_string()).emit();
                return Err(e.into());
            }
        };

        let user = match self.store.find_by_id(user_id).await? {
            Some(user) => user,
            None => {
                AuditLog::failure(AuditAction::Refresh, Some(user_id), "subject no longer exists")
                    .emit();
                return Err(AuthError::InvalidToken(TokenError::Revoked).into());
            }
        };

        let presented_digest = digest_token(presented);
        match user.refresh_token_hash.as_deref() {
            None => {
                // Logged out, or revoked after a password change
                AuditLog::failure(AuditAction::Refresh, Some(user_id), "no active session").emit();
                return Err(AuthError::InvalidToken(TokenError::Revoked).into());
            }
            Some(current) if current != presented_digest => {
                return Err(self.reject_reuse(user_id).await);
            }
            Some(_) => {}
        }

        let pair = self.issue_pair(user_id)?;
        let new_digest = digest_token(&pair.refresh_token);

        match self
            .store
            .compare_and_set_refresh_token(user_id, Some(&presented_digest), Some(&new_digest))
            .await?
        {
            SwapOutcome::Swapped => {
                AuditLog::success(AuditAction::Refresh, user_id).emit();
                Ok(pair)
            }
            // Another refresh committed between our read and our write
            SwapOutcome::Conflict => Err(self.reject_reuse(user_id).await),
        }
    }

    async fn reject_reuse(&self, user_id: Uuid) -> AppError {
        AuditLog::failure(
            AuditAction::TokenReuse,
            Some(user_id),
            AuthError::TokenReused.to_string(),
        )
        .emit();

        if self.reuse_policy == ReusePolicy::RevokeSession {
            if let Err(e) = self.store.clear_refresh_token(user_id).await {
                // The reuse is still reported; revocation is best effort here
                tracing::error!(user_id = %user_id, error = %e, "Failed to revoke session after token reuse");
            } else {
                tracing::warn!(user_id = %user_id, "Session revoked after refresh token reuse");
            }
        }

        AuthError::TokenReused.into()
    }

    /// End the user's session. Idempotent.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        self.store.clear_refresh_token(user_id).await?;
        AuditLog::success(AuditAction::Logout, user_id).emit();
        Ok(())
    }

    /// Replace the user's password and revoke the current session.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !self.hasher.verify_password(current_password, &user.password_hash) {
            AuditLog::failure(
                AuditAction::PasswordChange,
                Some(user_id),
                AuthError::InvalidCredential.to_string(),
            )
            .emit();
            return Err(AuthError::InvalidCredential.into());
        }

        let password_hash = self.hasher.hash_password(new_password)?;
        self.store.update_credential(user_id, &password_hash).await?;

        AuditLog::success(AuditAction::PasswordChange, user_id).emit();
        Ok(())
    }

    /// Profile of the authenticated principal
    pub async fn current_user(&self, principal: &Principal) -> Result<UserRecord, AppError> {
        self.store
            .find_by_id(principal.user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound.into())
    }

    fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.codec.issue(user_id, TokenClass::Access, now)?,
            refresh_token: self.codec.issue(user_id, TokenClass::Refresh, now)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Write another request commits right after this store hands out a user
    enum Interleave {
        ChangeCredential(String),
        CommitRefreshToken(String),
    }

    /// Wraps the in-memory store and runs one `Interleave` after the next read
    struct InterleavingStore {
        inner: InMemoryCredentialStore,
        after_read: Mutex<Option<Interleave>>,
    }

    impl InterleavingStore {
        fn new(inner: InMemoryCredentialStore) -> Self {
            Self {
                inner,
                after_read: Mutex::new(None),
            }
        }

        fn arm(&self, step: Interleave) {
            *self.after_read.lock().unwrap() = Some(step);
        }

        async fn interleave(&self, user: &Option<UserRecord>) -> Result<(), StoreError> {
            let step = self.after_read.lock().unwrap().take();
            match (step, user) {
                (Some(Interleave::ChangeCredential(hash)), Some(user)) => {
                    self.inner.update_credential(user.id, &hash).await
                }
                (Some(Interleave::CommitRefreshToken(digest)), Some(user)) => {
                    let outcome = self
                        .inner
                        .compare_and_set_refresh_token(
                            user.id,
                            user.refresh_token_hash.as_deref(),
                            Some(&digest),
                        )
                        .await?;
                    assert_eq!(outcome, SwapOutcome::Swapped);
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl CredentialStore for InterleavingStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
            let user = self.inner.find_by_id(id).await?;
            self.interleave(&user).await?;
            Ok(user)
        }

        async fn find_by_identifier(
            &self,
            identifier: &str,
        ) -> Result<Option<UserRecord>, StoreError> {
            let user = self.inner.find_by_identifier(identifier).await?;
            self.interleave(&user).await?;
            Ok(user)
        }

        async fn compare_and_set_refresh_token(
            &self,
            user_id: Uuid,
            expected: Option<&str>,
            new: Option<&str>,
        ) -> Result<SwapOutcome, StoreError> {
            self.inner.compare_and_set_refresh_token(user_id, expected, new).await
        }

        async fn set_refresh_token_if_credential(
            &self,
            user_id: Uuid,
            password_hash: &str,
            new: &str,
        ) -> Result<SwapOutcome, StoreError> {
            self.inner
                .set_refresh_token_if_credential(user_id, password_hash, new)
                .await
        }

        async fn clear_refresh_token(&self, user_id: Uuid) -> Result<(), StoreError> {
            self.inner.clear_refresh_token(user_id).await
        }

        async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
            self.inner.create_user(user).await
        }

        async fn update_credential(
            &self,
            user_id: Uuid,
            password_hash: &str,
        ) -> Result<(), StoreError> {
            self.inner.update_credential(user_id, password_hash).await
        }
    }

    async fn interleaving_manager(
        reuse_policy: ReusePolicy,
    ) -> (SessionManager, Arc<InterleavingStore>, UserRecord) {
        let store = Arc::new(InterleavingStore::new(InMemoryCredentialStore::new()));
        let manager = SessionManager::new(store.clone(), &settings(reuse_policy));
        let user = manager
            .register(Registration {
                full_name: "John Doe".to_string(),
                username: "JohnDoe".to_string(),
                email: "john@example.com".to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("Failed to register");
        (manager, store, user)
    }

    const PASSWORD: &str = "SecurePass123";

    fn settings(reuse_policy: ReusePolicy) -> AuthSettings {
        AuthSettings {
            access_token_secret: "access-secret-key-at-least-32-characters".to_string(),
            refresh_token_secret: "refresh-secret-key-at-least-32-characters".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 864000,
            issuer: "test".to_string(),
            password_hash_cost: 4,
            reuse_policy,
        }
    }

    async fn manager_with_user(
        reuse_policy: ReusePolicy,
    ) -> (SessionManager, Arc<InMemoryCredentialStore>, UserRecord) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = SessionManager::new(store.clone(), &settings(reuse_policy));
        let user = manager
            .register(Registration {
                full_name: "John Doe".to_string(),
                username: "JohnDoe".to_string(),
                email: "john@example.com".to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("Failed to register");
        (manager, store, user)
    }

    fn assert_auth_error(result: Result<impl std::fmt::Debug, AppError>, expected: AuthError) {
        match result {
            Err(AppError::Auth(kind)) => assert_eq!(kind, expected),
            other => panic!("Expected {:?}, got {:?}", expected, other),
        }
    }

    #[tokio::test]
    async fn register_lowercases_username_and_hashes_password() {
        let (_, _, user) = manager_with_user(ReusePolicy::Reject).await;

        assert_eq!(user.username, "johndoe");
        assert_ne!(user.password_hash, PASSWORD);
        assert!(user.refresh_token_hash.is_none());
    }

    #[tokio::test]
    async fn login_with_right_password_returns_pair_for_same_subject() {
        let (manager, store, user) = manager_with_user(ReusePolicy::Reject).await;

        let (_, pair) = manager.login("johndoe", PASSWORD).await.expect("login failed");

        let now = Utc::now();
        let codec = manager.codec();
        assert_eq!(codec.verify(&pair.access_token, TokenClass::Access, now), Ok(user.id));
        assert_eq!(codec.verify(&pair.refresh_token, TokenClass::Refresh, now), Ok(user.id));

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash, Some(digest_token(&pair.refresh_token)));
    }

    #[tokio::test]
    async fn login_accepts_email_identifier() {
        let (manager, _, user) = manager_with_user(ReusePolicy::Reject).await;
        let (logged_in, _) = manager.login("john@example.com", PASSWORD).await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn login_with_wrong_password_fails() {
        let (manager, _, _) = manager_with_user(ReusePolicy::Reject).await;
        assert_auth_error(
            manager.login("johndoe", "WrongPass123").await,
            AuthError::InvalidCredential,
        );
    }

    #[tokio::test]
    async fn login_unknown_user_fails_not_found() {
        let (manager, _, _) = manager_with_user(ReusePolicy::Reject).await;
        assert_auth_error(manager.login("nobody", PASSWORD).await, AuthError::NotFound);
    }

    #[tokio::test]
    async fn second_login_ends_first_session() {
        let (manager, _, _) = manager_with_user(ReusePolicy::Reject).await;

        let (_, first) = manager.login("johndoe", PASSWORD).await.unwrap();
        let (_, _second) = manager.login("johndoe", PASSWORD).await.unwrap();

        assert_auth_error(
            manager.refresh(Some(&first.refresh_token)).await,
            AuthError::TokenReused,
        );
    }

    #[tokio::test]
    async fn refresh_without_token_is_unauthenticated() {
        let (manager, _, _) = manager_with_user(ReusePolicy::Reject).await;

        assert_auth_error(manager.refresh(None).await, AuthError::Unauthenticated);
        assert_auth_error(manager.refresh(Some("  ")).await, AuthError::Unauthenticated);
    }

    #[tokio::test]
    async fn refresh_with_access_token_is_wrong_class() {
        let (manager, _, _) = manager_with_user(ReusePolicy::Reject).await;
        let (_, pair) = manager.login("johndoe", PASSWORD).await.unwrap();

        assert_auth_error(
            manager.refresh(Some(&pair.access_token)).await,
            AuthError::InvalidToken(TokenError::WrongClass),
        );
    }

    #[tokio::test]
    async fn refresh_with_garbage_is_invalid() {
        let (manager, _, _) = manager_with_user(ReusePolicy::Reject).await;
        assert_auth_error(
            manager.refresh(Some("definitely.not.valid")).await,
            AuthError::InvalidToken(TokenError::Malformed),
        );
    }

    #[tokio::test]
    async fn refresh_for_deleted_user_is_invalid() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = SessionManager::new(store, &settings(ReusePolicy::Reject));
        let token = manager
            .codec()
            .issue(Uuid::new_v4(), TokenClass::Refresh, Utc::now())
            .unwrap();

        assert_auth_error(
            manager.refresh(Some(&token)).await,
            AuthError::InvalidToken(TokenError::Revoked),
        );
    }

    #[tokio::test]
    async fn rotation_scenario() {
        let (manager, _, user) = manager_with_user(ReusePolicy::Reject).await;

        let (_, first) = manager.login("johndoe", PASSWORD).await.unwrap();

        let second = manager.refresh(Some(&first.refresh_token)).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        assert_auth_error(
            manager.refresh(Some(&first.refresh_token)).await,
            AuthError::TokenReused,
        );

        let third = manager.refresh(Some(&second.refresh_token)).await.unwrap();
        assert_ne!(second.refresh_token, third.refresh_token);

        manager.logout(user.id).await.unwrap();

        assert!(manager.refresh(Some(&third.refresh_token)).await.is_err());
    }

    #[tokio::test]
    async fn reuse_revokes_session_under_revoke_policy() {
        let (manager, store, user) = manager_with_user(ReusePolicy::RevokeSession).await;

        let (_, first) = manager.login("johndoe", PASSWORD).await.unwrap();
        let second = manager.refresh(Some(&first.refresh_token)).await.unwrap();

        assert_auth_error(
            manager.refresh(Some(&first.refresh_token)).await,
            AuthError::TokenReused,
        );

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token_hash.is_none());
        assert!(manager.refresh(Some(&second.refresh_token)).await.is_err());
    }

    #[tokio::test]
    async fn logout_is_final_and_idempotent() {
        let (manager, _, user) = manager_with_user(ReusePolicy::Reject).await;
        let (_, pair) = manager.login("johndoe", PASSWORD).await.unwrap();

        manager.logout(user.id).await.unwrap();
        manager.logout(user.id).await.unwrap();

        assert_auth_error(
            manager.refresh(Some(&pair.refresh_token)).await,
            AuthError::InvalidToken(TokenError::Revoked),
        );
    }

    #[tokio::test]
    async fn concurrent_refreshes_with_same_token_succeed_once() {
        for policy in [ReusePolicy::Reject, ReusePolicy::RevokeSession] {
            let (manager, _, _) = manager_with_user(policy).await;
            let (_, pair) = manager.login("johndoe", PASSWORD).await.unwrap();

            let (a, b) = tokio::join!(
                manager.refresh(Some(&pair.refresh_token)),
                manager.refresh(Some(&pair.refresh_token)),
            );

            let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
            assert_eq!(successes, 1, "policy {:?}", policy);

            let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
            assert_auth_error(loser, AuthError::TokenReused);

            let winner = winner.unwrap();
            let follow_up = manager.refresh(Some(&winner.refresh_token)).await;
            match policy {
                ReusePolicy::Reject => assert!(follow_up.is_ok()),
                ReusePolicy::RevokeSession => assert_auth_error(
                    follow_up,
                    AuthError::InvalidToken(TokenError::Revoked),
                ),
            }
        }
    }

    #[tokio::test]
    async fn refresh_losing_the_write_follows_reuse_policy() {
        // The other refresh commits between our read and our compare-and-set
        for policy in [ReusePolicy::Reject, ReusePolicy::RevokeSession] {
            let (manager, store, user) = interleaving_manager(policy).await;
            let (_, pair) = manager.login("johndoe", PASSWORD).await.unwrap();

            store.arm(Interleave::CommitRefreshToken("winner-digest".to_string()));
            assert_auth_error(
                manager.refresh(Some(&pair.refresh_token)).await,
                AuthError::TokenReused,
            );

            let stored = store.find_by_id(user.id).await.unwrap().unwrap();
            match policy {
                ReusePolicy::Reject => {
                    assert_eq!(stored.refresh_token_hash.as_deref(), Some("winner-digest"))
                }
                ReusePolicy::RevokeSession => assert!(stored.refresh_token_hash.is_none()),
            }
        }
    }

    #[tokio::test]
    async fn refresh_reading_after_the_other_commit_follows_reuse_policy() {
        // The other refresh has already committed when we read
        for policy in [ReusePolicy::Reject, ReusePolicy::RevokeSession] {
            let (manager, store, user) = manager_with_user(policy).await;
            let (_, pair) = manager.login("johndoe", PASSWORD).await.unwrap();

            let winner = manager.refresh(Some(&pair.refresh_token)).await.unwrap();
            assert_auth_error(
                manager.refresh(Some(&pair.refresh_token)).await,
                AuthError::TokenReused,
            );

            let stored = store.find_by_id(user.id).await.unwrap().unwrap();
            match policy {
                ReusePolicy::Reject => assert_eq!(
                    stored.refresh_token_hash,
                    Some(digest_token(&winner.refresh_token))
                ),
                ReusePolicy::RevokeSession => assert!(stored.refresh_token_hash.is_none()),
            }
        }
    }

    #[tokio::test]
    async fn login_fails_when_password_changes_before_session_is_written() {
        let (manager, store, user) = interleaving_manager(ReusePolicy::Reject).await;
        let rotated = PasswordHasher::new(4).hash_password("NewSecurePass456").unwrap();

        store.arm(Interleave::ChangeCredential(rotated));
        assert_auth_error(
            manager.login("johndoe", PASSWORD).await,
            AuthError::InvalidCredential,
        );

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token_hash.is_none());
        assert!(manager.login("johndoe", "NewSecurePass456").await.is_ok());
    }

    #[tokio::test]
    async fn login_overwrites_session_committed_concurrently() {
        let (manager, store, user) = interleaving_manager(ReusePolicy::Reject).await;

        store.arm(Interleave::CommitRefreshToken("other-login".to_string()));
        let (_, pair) = manager
            .login("johndoe", PASSWORD)
            .await
            .expect("login should win over the concurrent session write");

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash, Some(digest_token(&pair.refresh_token)));
    }

    #[tokio::test]
    async fn login_identifier_is_case_insensitive() {
        let (manager, _, user) = manager_with_user(ReusePolicy::Reject).await;

        let (by_name, _) = manager.login("JohnDoe", PASSWORD).await.unwrap();
        let (by_email, _) = manager.login("  John@Example.COM ", PASSWORD).await.unwrap();

        assert_eq!(by_name.id, user.id);
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn register_lowercases_email() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = SessionManager::new(store, &settings(ReusePolicy::Reject));
        let user = manager
            .register(Registration {
                full_name: "Jane Doe".to_string(),
                username: "jane".to_string(),
                email: "Jane.Doe@Example.com".to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap();

        assert_eq!(user.email, "jane.doe@example.com");
        assert!(manager.login("jane.doe@example.com", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_revokes_session() {
        let (manager, _, user) = manager_with_user(ReusePolicy::Reject).await;
        let (_, pair) = manager.login("johndoe", PASSWORD).await.unwrap();

        manager
            .change_password(user.id, PASSWORD, "NewSecurePass456")
            .await
            .expect("change failed");

        assert!(manager.refresh(Some(&pair.refresh_token)).await.is_err());
        assert_auth_error(
            manager.login("johndoe", PASSWORD).await,
            AuthError::InvalidCredential,
        );
        assert!(manager.login("johndoe", "NewSecurePass456").await.is_ok());
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let (manager, _, user) = manager_with_user(ReusePolicy::Reject).await;

        assert_auth_error(
            manager.change_password(user.id, "WrongPass123", "NewSecurePass456").await,
            AuthError::InvalidCredential,
        );
    }

    #[tokio::test]
    async fn current_user_resolves_principal() {
        let (manager, _, user) = manager_with_user(ReusePolicy::Reject).await;
        let principal = Principal {
            user_id: user.id,
            expires_at: Utc::now().timestamp() + 60,
        };

        let found = manager.current_user(&principal).await.unwrap();
        assert_eq!(found.email, "john@example.com");
    }
}
