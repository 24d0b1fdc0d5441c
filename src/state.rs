use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use time::Duration;
use tracing::{info, warn};

use crate::auth::csrf::CsrfKey;
use crate::auth::memory::MemoryCredentialStore;
use crate::auth::repo::PgCredentialStore;
use crate::auth::reset::PasswordResetService;
use crate::auth::services::AuthService;
use crate::auth::store::CredentialStore;
use crate::config::AppConfig;
use crate::email::{EmailSender, LogEmailSender, SmtpEmailSender};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub resets: PasswordResetService,
    pub csrf: CsrfKey,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn CredentialStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres credential store");
                Arc::new(PgCredentialStore::new(db))
            }
            None => {
                warn!("DATABASE_URL not set; credentials are kept in memory and lost on restart");
                Arc::new(MemoryCredentialStore::new())
            }
        };

        let mailer: Arc<dyn EmailSender> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpEmailSender::new(smtp)?),
            None => {
                warn!("SMTP_HOST not set; emails are logged, not sent");
                Arc::new(LogEmailSender)
            }
        };

        Self::from_parts(config, store, mailer)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> anyhow::Result<Self> {
        let csrf = match &config.session.csrf_key {
            Some(key) => CsrfKey::new(key.as_bytes()),
            None => {
                warn!("CSRF_KEY not set; using a per-process key");
                CsrfKey::random()?
            }
        };
        let auth = AuthService::new(store);
        let resets = PasswordResetService::new(
            auth.clone(),
            mailer,
            &config.server_url,
            Duration::minutes(config.reset.ttl_minutes),
        )
        .context("configure password resets")?;

        Ok(Self {
            config,
            auth,
            resets,
            csrf,
        })
    }

    /// In-memory store and log mailer with test configuration.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(LogEmailSender),
        )
        .expect("fake state")
    }
}
