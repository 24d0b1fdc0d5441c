use anyhow::Context;

use crate::auth::reset::DEFAULT_RESET_TTL;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_secure: bool,
    /// Key for tagging anti-forgery tokens. Random per process when unset.
    pub csrf_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResetConfig {
    pub ttl_minutes: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// In-memory store when unset.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Public base URL, used to build reset links.
    pub server_url: String,
    pub session: SessionConfig,
    pub reset: ResetConfig,
    pub smtp: Option<SmtpConfig>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_opt(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {v:?}")),
        None => Ok(default),
    }
}

/// Longest reset window accepted from the environment: one day.
pub const MAX_RESET_TTL_MINUTES: i64 = 24 * 60;

fn reset_ttl_minutes() -> anyhow::Result<i64> {
    let minutes = env_parse("RESET_TOKEN_TTL_MINUTES", DEFAULT_RESET_TTL.whole_minutes())?;
    anyhow::ensure!(
        (1..=MAX_RESET_TTL_MINUTES).contains(&minutes),
        "RESET_TOKEN_TTL_MINUTES must be between 1 and {MAX_RESET_TTL_MINUTES}, got {minutes}"
    );
    Ok(minutes)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env_parse("APP_PORT", 8080u16)?;
        let smtp = match env_opt("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT", 587u16)?,
                username: env_opt("SMTP_USERNAME"),
                password: env_opt("SMTP_PASSWORD"),
                from: env_opt("EMAIL_FROM")
                    .unwrap_or_else(|| "Lenslock <support@lenslock.local>".into()),
            }),
            None => None,
        };

        Ok(Self {
            database_url: env_opt("DATABASE_URL"),
            host: env_opt("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            server_url: env_opt("SERVER_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            session: SessionConfig {
                cookie_secure: env_parse("COOKIE_SECURE", false)?,
                csrf_key: env_opt("CSRF_KEY"),
            },
            reset: ResetConfig {
                ttl_minutes: reset_ttl_minutes()?,
                sweep_interval_secs: env_parse("RESET_SWEEP_INTERVAL_SECS", 600u64)?,
            },
            smtp,
        })
    }

    /// Defaults suitable for tests: in-memory store, log mailer.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            host: "127.0.0.1".into(),
            port: 0,
            server_url: "http://localhost:8080".into(),
            session: SessionConfig {
                cookie_secure: false,
                csrf_key: Some("test-csrf-key".into()),
            },
            reset: ResetConfig {
                ttl_minutes: DEFAULT_RESET_TTL.whole_minutes(),
                sweep_interval_secs: 0,
            },
            smtp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 13] = [
        "DATABASE_URL",
        "APP_HOST",
        "APP_PORT",
        "SERVER_URL",
        "COOKIE_SECURE",
        "CSRF_KEY",
        "RESET_TOKEN_TTL_MINUTES",
        "RESET_SWEEP_INTERVAL_SECS",
        "SMTP_HOST",
        "SMTP_PORT",
        "SMTP_USERNAME",
        "SMTP_PASSWORD",
        "EMAIL_FROM",
    ];

    fn env_with(
        overrides: &[(&'static str, &'static str)],
    ) -> Vec<(&'static str, Option<&'static str>)> {
        KEYS.iter()
            .map(|k| (*k, overrides.iter().find(|(o, _)| o == k).map(|(_, v)| *v)))
            .collect()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        temp_env::with_vars(env_with(&[]), || {
            let cfg = AppConfig::from_env().unwrap();
            assert!(cfg.database_url.is_none());
            assert_eq!(cfg.host, "0.0.0.0");
            assert_eq!(cfg.port, 8080);
            assert_eq!(cfg.server_url, "http://localhost:8080");
            assert!(!cfg.session.cookie_secure);
            assert_eq!(cfg.reset.ttl_minutes, 60);
            assert_eq!(cfg.reset.sweep_interval_secs, 600);
            assert!(cfg.smtp.is_none());
        });
    }

    #[test]
    fn reads_explicit_values() {
        let vars = env_with(&[
            ("DATABASE_URL", "postgres://u:p@db/lenslock"),
            ("APP_PORT", "3000"),
            ("SERVER_URL", "https://lenslock.example"),
            ("COOKIE_SECURE", "true"),
            ("RESET_TOKEN_TTL_MINUTES", "15"),
            ("SMTP_HOST", "smtp.example"),
            ("SMTP_PORT", "2525"),
            ("SMTP_USERNAME", "mailer"),
        ]);
        temp_env::with_vars(vars, || {
            let cfg = AppConfig::from_env().unwrap();
            assert_eq!(cfg.database_url.as_deref(), Some("postgres://u:p@db/lenslock"));
            assert_eq!(cfg.port, 3000);
            assert_eq!(cfg.server_url, "https://lenslock.example");
            assert!(cfg.session.cookie_secure);
            assert_eq!(cfg.reset.ttl_minutes, 15);
            let smtp = cfg.smtp.expect("smtp configured");
            assert_eq!(smtp.host, "smtp.example");
            assert_eq!(smtp.port, 2525);
            assert_eq!(smtp.username.as_deref(), Some("mailer"));
            assert!(smtp.password.is_none());
        });
    }

    #[test]
    fn reset_ttl_out_of_range_is_an_error() {
        for bad in ["0", "-5", "1441", "9223372036854775807"] {
            temp_env::with_vars(env_with(&[("RESET_TOKEN_TTL_MINUTES", bad)]), || {
                let err = AppConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("RESET_TOKEN_TTL_MINUTES"), "{bad}: {err}");
            });
        }
        temp_env::with_vars(env_with(&[("RESET_TOKEN_TTL_MINUTES", "1440")]), || {
            assert_eq!(AppConfig::from_env().unwrap().reset.ttl_minutes, MAX_RESET_TTL_MINUTES);
        });
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let vars = env_with(&[("APP_PORT", "eighty")]);
        temp_env::with_vars(vars, || {
            let err = AppConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("APP_PORT"));
        });
    }
}
