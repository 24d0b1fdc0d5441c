use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::password::{
    hash_password, normalize_email, validate_password, validated_email, verify_dummy_password,
    verify_password,
};
use crate::auth::repo_types::User;
use crate::auth::store::CredentialStore;
use crate::auth::token::{generate_token, hash_token, MIN_TOKEN_BYTES};
use crate::error::{AuthError, StoreError};

pub const SESSION_TOKEN_BYTES: usize = MIN_TOKEN_BYTES;

/// Run argon2 work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("password hashing task failed")
}

/// Signup, login and session lifecycle on top of a [`CredentialStore`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Register a user and sign them in. Returns the user and the plaintext
    /// session token for the cookie.
    pub async fn signup(&self, email: &str, password: &str) -> Result<(User, String), AuthError> {
        let email = validated_email(email)?;
        validate_password(password)?;

        let plain = password.to_owned();
        let hash = blocking(move || hash_password(&plain)).await??;

        let user = match self.store.create_user(&email, &hash).await {
            Ok(u) => u,
            Err(StoreError::DuplicateEmail) => {
                info!("signup for an already registered email");
                return Err(AuthError::DuplicateEmail);
            }
            Err(e) => return Err(e.into()),
        };
        info!(user_id = %user.id, email = %user.email, "user registered");

        let token = self.create_session(&user).await?;
        Ok((user, token))
    }

    /// Check an email/password pair. Unknown emails and wrong passwords fail
    /// identically, and both pay for one argon2 verification.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let plain = password.to_owned();

        let user = match self.store.user_by_email(&email).await {
            Ok(u) => u,
            Err(StoreError::NotFound) => {
                blocking(move || verify_dummy_password(&plain)).await?;
                warn!("login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        let stored = user.password_hash.clone();
        let ok = blocking(move || verify_password(&plain, &stored)).await??;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user authenticated");
        Ok(user)
    }

    /// Issue a new session for `user`, replacing any session it already had.
    pub async fn create_session(&self, user: &User) -> Result<String, AuthError> {
        let token = generate_token(SESSION_TOKEN_BYTES)?;
        let token_hash = hash_token(&token);
        match self.store.upsert_session(user.id, &token_hash).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                return Err(anyhow::anyhow!("session owner {} does not exist", user.id).into())
            }
            Err(e) => return Err(e.into()),
        }
        debug!(user_id = %user.id, "session issued");
        Ok(token)
    }

    /// Map a presented session token back to its user. Never extends or
    /// re-issues the session.
    pub async fn resolve_session(&self, token: &str) -> Result<User, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidSession);
        }
        match self.store.user_by_session(&hash_token(token)).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(AuthError::InvalidSession),
            Err(e) => Err(e.into()),
        }
    }

    /// Revoke a session. Unknown tokens are ignored.
    pub async fn end_session(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Ok(());
        }
        self.store.delete_session(&hash_token(token)).await?;
        debug!("session ended");
        Ok(())
    }

    /// Replace a user's password after validating it.
    pub async fn set_password(&self, user_id: Uuid, password: &str) -> Result<(), AuthError> {
        validate_password(password)?;
        let plain = password.to_owned();
        let hash = blocking(move || hash_password(&plain)).await??;
        self.store.update_password_hash(user_id, &hash).await?;
        info!(user_id = %user_id, "password updated");
        Ok(())
    }
}
