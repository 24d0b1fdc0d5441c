use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{PasswordReset, User};
use crate::auth::store::{CredentialStore, StoreResult};
use crate::auth::token::TokenHash;
use crate::error::StoreError;

/// Postgres-backed credential store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await;

        match user {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateEmail),
            Err(e) => Err(StoreError::Backend(anyhow::Error::new(e).context("insert user"))),
        }
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("update password hash")?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert_session(&self, user_id: Uuid, token_hash: &TokenHash) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, token_hash)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, created_at = now()
            "#,
        )
        .bind(user_id)
        .bind(token_hash.as_str())
        .execute(&self.db)
        .await
        .context("upsert session")?;
        Ok(())
    }

    async fn user_by_session(&self, token_hash: &TokenHash) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.password_hash, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1
            "#,
        )
        .bind(token_hash.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_session(&self, token_hash: &TokenHash) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM sessions WHERE token_hash = $1"#)
            .bind(token_hash.as_str())
            .execute(&self.db)
            .await
            .context("delete session")?;
        Ok(())
    }

    async fn upsert_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &TokenHash,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        let reset = sqlx::query_as::<_, PasswordReset>(
            r#"
            INSERT INTO password_resets (user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash,
                          created_at = EXCLUDED.created_at,
                          expires_at = EXCLUDED.expires_at
            RETURNING id, user_id, token_hash, created_at, expires_at
            "#,
        )
        .bind(user_id)
        .bind(token_hash.as_str())
        .bind(created_at)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .context("upsert password reset")?;
        Ok(reset)
    }

    async fn password_reset_by_hash(
        &self,
        token_hash: &TokenHash,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        let reset = sqlx::query_as::<_, PasswordReset>(
            r#"
            SELECT id, user_id, token_hash, created_at, expires_at
            FROM password_resets
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)?;

        if reset.is_expired_at(now) {
            self.delete_password_reset(reset.id).await?;
            return Err(StoreError::NotFound);
        }
        Ok(reset)
    }

    async fn consume_password_reset(
        &self,
        token_hash: &TokenHash,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        sqlx::query_as::<_, PasswordReset>(
            r#"
            DELETE FROM password_resets
            WHERE token_hash = $1 AND expires_at >= $2
            RETURNING id, user_id, token_hash, created_at, expires_at
            "#,
        )
        .bind(token_hash.as_str())
        .bind(now)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_password_reset(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM password_resets WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete password reset")?;
        Ok(())
    }

    async fn delete_expired_password_resets(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let result = sqlx::query(r#"DELETE FROM password_resets WHERE expires_at < $1"#)
            .bind(now)
            .execute(&self.db)
            .await
            .context("sweep expired password resets")?;
        Ok(result.rows_affected())
    }
}
