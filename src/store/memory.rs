use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CredentialStore, NewUser, SwapOutcome, UserRecord};
use crate::error::StoreError;

/// Process-local credential store
///
/// Every operation runs under one mutex, which gives the compare-and-set the
/// same atomicity the database gets from a single conditional UPDATE. Used
/// by the test suites and for running the service without Postgres.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    users: Arc<Mutex<HashMap<Uuid, UserRecord>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> Result<MutexGuard<'_, HashMap<Uuid, UserRecord>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Unavailable("user table lock poisoned".to_string()))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users()?.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users()?;
        Ok(users
            .values()
            .find(|u| u.username == identifier || u.email == identifier)
            .cloned())
    }

    async fn compare_and_set_refresh_token(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<SwapOutcome, StoreError> {
        let mut users = self.users()?;
        match users.get_mut(&user_id) {
            Some(user) if user.refresh_token_hash.as_deref() == expected => {
                user.refresh_token_hash = new.map(str::to_string);
                Ok(SwapOutcome::Swapped)
            }
            _ => Ok(SwapOutcome::Conflict),
        }
    }

    async fn set_refresh_token_if_credential(
        &self,
        user_id: Uuid,
        password_hash: &str,
        new: &str,
    ) -> Result<SwapOutcome, StoreError> {
        let mut users = self.users()?;
        match users.get_mut(&user_id) {
            Some(user) if user.password_hash == password_hash => {
                user.refresh_token_hash = Some(new.to_string());
                Ok(SwapOutcome::Swapped)
            }
            _ => Ok(SwapOutcome::Conflict),
        }
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> Result<(), StoreError> {
        if let Some(user) = self.users()?.get_mut(&user_id) {
            user.refresh_token_hash = None;
        }
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut users = self.users()?;
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("username".to_string()));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email".to_string()));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash,
            refresh_token_hash: None,
            created_at: Utc::now(),
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_credential(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        if let Some(user) = self.users()?.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.refresh_token_hash = None;
        }
        Ok(())
    }
}
