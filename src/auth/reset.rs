//! Forgotten-password flow: single-use, time-boxed reset tokens.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::password::{normalize_email, validate_password};
use crate::auth::repo_types::User;
use crate::auth::services::AuthService;
use crate::auth::token::{generate_token, hash_token, MIN_TOKEN_BYTES};
use crate::email::EmailSender;
use crate::error::{AuthError, StoreError};

pub const RESET_TOKEN_BYTES: usize = MIN_TOKEN_BYTES;
pub const DEFAULT_RESET_TTL: Duration = Duration::hours(1);
pub const RESET_EMAIL_SUBJECT: &str = "Reset your password";

/// A reset token that was stored for a user.
#[derive(Debug)]
pub struct ResetIssued {
    pub user: User,
    pub token: String,
    /// Outcome of handing the link to the mailer. A failure here leaves the
    /// token valid.
    pub delivery: Result<(), String>,
}

#[derive(Clone)]
pub struct PasswordResetService {
    auth: AuthService,
    mailer: Arc<dyn EmailSender>,
    base_url: Url,
    ttl: Duration,
}

/// `<base>/reset-pw?token=<token>`
pub fn reset_link(base_url: &Url, token: &str) -> String {
    let mut url = base_url.clone();
    url.set_path("/reset-pw");
    url.set_fragment(None);
    url.query_pairs_mut().clear().append_pair("token", token);
    url.to_string()
}

fn reset_email_body(link: &str, ttl: Duration) -> String {
    format!(
        "Hi,\n\nSomeone asked to reset the password for this account. \
         Open the link below to choose a new one:\n\n{link}\n\n\
         The link expires in {} minutes and works once. \
         If you did not ask for this, you can ignore this email.\n",
        ttl.whole_minutes()
    )
}

impl PasswordResetService {
    pub fn new(
        auth: AuthService,
        mailer: Arc<dyn EmailSender>,
        base_url: &str,
        ttl: Duration,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        anyhow::ensure!(ttl.is_positive(), "reset token ttl must be positive");
        Ok(Self {
            auth,
            mailer,
            base_url,
            ttl,
        })
    }

    pub async fn request_reset(&self, email: &str) -> Result<Option<ResetIssued>, AuthError> {
        self.request_reset_at(email, OffsetDateTime::now_utc()).await
    }

    /// Issue a reset token for `email` and mail the link. Unknown emails
    /// return `Ok(None)` without touching tokens or the mailer; the caller
    /// must respond the same way in both cases.
    pub async fn request_reset_at(
        &self,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<Option<ResetIssued>, AuthError> {
        let email = normalize_email(email);
        let store = self.auth.store();
        let user = match store.user_by_email(&email).await {
            Ok(u) => u,
            Err(StoreError::NotFound) => {
                info!("password reset requested for unknown email");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let token = generate_token(RESET_TOKEN_BYTES)?;
        let reset = store
            .upsert_password_reset(user.id, &hash_token(&token), now, now + self.ttl)
            .await?;
        info!(user_id = %user.id, expires_at = %reset.expires_at, "password reset issued");

        let link = reset_link(&self.base_url, &token);
        let delivery = self
            .mailer
            .send(&user.email, RESET_EMAIL_SUBJECT, &reset_email_body(&link, self.ttl))
            .await
            .map_err(|e| {
                warn!(user_id = %user.id, error = %e, "password reset email not delivered");
                e.to_string()
            });

        Ok(Some(ResetIssued {
            user,
            token,
            delivery,
        }))
    }

    pub async fn check_reset(&self, token: &str) -> Result<User, AuthError> {
        self.check_reset_at(token, OffsetDateTime::now_utc()).await
    }

    /// Confirm a reset token is live without consuming it.
    pub async fn check_reset_at(&self, token: &str, now: OffsetDateTime) -> Result<User, AuthError> {
        let store = self.auth.store();
        let reset = match store.password_reset_by_hash(&hash_token(token), now).await {
            Ok(r) => r,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidOrExpiredToken),
            Err(e) => return Err(e.into()),
        };
        match store.user_by_id(reset.user_id).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(AuthError::InvalidOrExpiredToken),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn complete_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(User, String), AuthError> {
        self.complete_reset_at(token, new_password, OffsetDateTime::now_utc())
            .await
    }

    /// Spend a reset token on a new password, then sign the user in. The
    /// token is consumed before the password is written, so it cannot be
    /// replayed even if a later step fails. A password that fails validation
    /// is rejected before the token is touched.
    pub async fn complete_reset_at(
        &self,
        token: &str,
        new_password: &str,
        now: OffsetDateTime,
    ) -> Result<(User, String), AuthError> {
        validate_password(new_password)?;

        let store = self.auth.store();
        let reset = match store.consume_password_reset(&hash_token(token), now).await {
            Ok(r) => r,
            Err(StoreError::NotFound) => {
                warn!("invalid or expired password reset token");
                return Err(AuthError::InvalidOrExpiredToken);
            }
            Err(e) => return Err(e.into()),
        };

        let user = match store.user_by_id(reset.user_id).await {
            Ok(u) => u,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidOrExpiredToken),
            Err(e) => return Err(e.into()),
        };
        self.auth.set_password(user.id, new_password).await?;
        let session = self.auth.create_session(&user).await?;
        info!(user_id = %user.id, "password reset completed");
        Ok((user, session))
    }

    /// Drop expired reset rows. Lookups already reject them, so this only
    /// keeps the table small.
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> Result<u64, AuthError> {
        Ok(self
            .auth
            .store()
            .delete_expired_password_resets(now)
            .await?)
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `every` until the
    /// runtime shuts down.
    pub fn spawn_sweeper(&self, every: std::time::Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.sweep_expired(OffsetDateTime::now_utc()).await {
                    Ok(0) => {}
                    Ok(n) => debug!(removed = n, "expired password resets swept"),
                    Err(e) => error!(error = %e, "password reset sweep failed"),
                }
            }
        })
    }
}
