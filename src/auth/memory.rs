//! In-process credential store used by tests and when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{PasswordReset, User};
use crate::auth::store::{CredentialStore, StoreResult};
use crate::auth::token::TokenHash;
use crate::error::StoreError;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    // email -> user id
    emails: HashMap<String, Uuid>,
    // token hash -> user id
    sessions: HashMap<String, Uuid>,
    // token hash -> reset row
    resets: HashMap<String, PasswordReset>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: RwLock<Tables>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.emails.contains_key(email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.emails.insert(user.email.clone(), user.id);
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<User> {
        let t = self.tables.read().await;
        t.emails
            .get(email)
            .and_then(|id| t.users.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<User> {
        let t = self.tables.read().await;
        t.users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let user = t.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn upsert_session(&self, user_id: Uuid, token_hash: &TokenHash) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        t.sessions.retain(|_, owner| *owner != user_id);
        t.sessions.insert(token_hash.as_str().to_string(), user_id);
        Ok(())
    }

    async fn user_by_session(&self, token_hash: &TokenHash) -> StoreResult<User> {
        let t = self.tables.read().await;
        t.sessions
            .get(token_hash.as_str())
            .and_then(|id| t.users.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_session(&self, token_hash: &TokenHash) -> StoreResult<()> {
        self.tables.write().await.sessions.remove(token_hash.as_str());
        Ok(())
    }

    async fn upsert_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &TokenHash,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        t.resets.retain(|_, r| r.user_id != user_id);
        let reset = PasswordReset {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.as_str().to_string(),
            created_at,
            expires_at,
        };
        t.resets.insert(reset.token_hash.clone(), reset.clone());
        Ok(reset)
    }

    async fn password_reset_by_hash(
        &self,
        token_hash: &TokenHash,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        let mut t = self.tables.write().await;
        let reset = t
            .resets
            .get(token_hash.as_str())
            .cloned()
            .ok_or(StoreError::NotFound)?;
        if reset.is_expired_at(now) {
            t.resets.remove(token_hash.as_str());
            return Err(StoreError::NotFound);
        }
        Ok(reset)
    }

    async fn consume_password_reset(
        &self,
        token_hash: &TokenHash,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        let mut t = self.tables.write().await;
        let reset = t
            .resets
            .remove(token_hash.as_str())
            .ok_or(StoreError::NotFound)?;
        if reset.is_expired_at(now) {
            return Err(StoreError::NotFound);
        }
        Ok(reset)
    }

    async fn delete_password_reset(&self, id: Uuid) -> StoreResult<()> {
        self.tables.write().await.resets.retain(|_, r| r.id != id);
        Ok(())
    }

    async fn delete_expired_password_resets(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.resets.len();
        t.resets.retain(|_, r| !r.is_expired_at(now));
        Ok((before - t.resets.len()) as u64)
    }
}
