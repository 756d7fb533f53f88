use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, NewUser, SwapOutcome, UserRecord};
use crate::error::StoreError;

type UserRow = (
    Uuid,
    String,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
);

const USER_COLUMNS: &str =
    "id, username, email, full_name, password_hash, refresh_token_hash, created_at";

fn into_record(row: UserRow) -> UserRecord {
    let (id, username, email, full_name, password_hash, refresh_token_hash, created_at) = row;
    UserRecord {
        id,
        username,
        email,
        full_name,
        password_hash,
        refresh_token_hash,
        created_at,
    }
}

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_record))
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = $1 OR email = $1 LIMIT 1",
            USER_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_record))
    }

    async fn compare_and_set_refresh_token(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<SwapOutcome, StoreError> {
        // Single conditional UPDATE: the read-compare-write is atomic in the
        // database, so two racing refreshes cannot both match.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $3, updated_at = $4
            WHERE id = $1 AND refresh_token_hash IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(user_id)
        .bind(expected)
        .bind(new)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(SwapOutcome::Swapped)
        } else {
            Ok(SwapOutcome::Conflict)
        }
    }

    async fn set_refresh_token_if_credential(
        &self,
        user_id: Uuid,
        password_hash: &str,
        new: &str,
    ) -> Result<SwapOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $3, updated_at = $4
            WHERE id = $1 AND password_hash = $2
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(new)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(SwapOutcome::Swapped)
        } else {
            Ok(SwapOutcome::Conflict)
        }
    }

    async fn clear_refresh_token(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = NULL, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, username, email, full_name, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %row.0, "Created user");
        Ok(into_record(row))
    }

    async fn update_credential(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, refresh_token_hash = NULL, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
