//! Persistence seam for users, sessions and password resets.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{PasswordReset, User};
use crate::auth::token::TokenHash;
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for credentials. Every mutation is persisted before the
/// call returns; each call touches a single user's rows.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] when the email is taken.
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;

    async fn user_by_email(&self, email: &str) -> StoreResult<User>;

    async fn user_by_id(&self, id: Uuid) -> StoreResult<User>;

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()>;

    /// Store the session fingerprint for a user, replacing any previous one.
    async fn upsert_session(&self, user_id: Uuid, token_hash: &TokenHash) -> StoreResult<()>;

    async fn user_by_session(&self, token_hash: &TokenHash) -> StoreResult<User>;

    /// Deleting an unknown session is not an error.
    async fn delete_session(&self, token_hash: &TokenHash) -> StoreResult<()>;

    /// Store a reset fingerprint for a user, replacing any outstanding one.
    async fn upsert_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &TokenHash,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> StoreResult<PasswordReset>;

    /// Look up a live reset. Expired rows are reported as `NotFound` and
    /// removed on the way out.
    async fn password_reset_by_hash(
        &self,
        token_hash: &TokenHash,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset>;

    /// Atomically remove and return a live reset. At most one caller can
    /// consume a given token.
    async fn consume_password_reset(
        &self,
        token_hash: &TokenHash,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset>;

    async fn delete_password_reset(&self, id: Uuid) -> StoreResult<()>;

    /// Remove every reset that expired before `now`; returns how many.
    async fn delete_expired_password_resets(&self, now: OffsetDateTime) -> StoreResult<u64>;
}
