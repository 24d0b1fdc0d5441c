//! Anti-forgery protection, layered next to (not instead of) the session.
//!
//! Double-submit scheme: the client holds a `lenslock_csrf` cookie of the form
//! `nonce.tag`, where `tag = HMAC-SHA256(key, nonce)`, and echoes it in the
//! `X-CSRF-Token` header on every state-changing request.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

use crate::auth::cookies::{cookie_value, csrf_cookie, CSRF_COOKIE_NAME};
use crate::auth::token::{constant_time_eq, generate_token, MIN_TOKEN_BYTES};
use crate::state::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Anti-forgery token for the current request, available to handlers.
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct CsrfKey(Arc<[u8]>);

impl CsrfKey {
    pub fn new(key: &[u8]) -> Self {
        Self(Arc::from(key))
    }

    pub fn random() -> anyhow::Result<Self> {
        Ok(Self::new(generate_token(MIN_TOKEN_BYTES)?.as_bytes()))
    }

    fn mac(&self, nonce: &str) -> anyhow::Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.0[..])
            .map_err(|e| anyhow::anyhow!("csrf key rejected: {e}"))?;
        mac.update(nonce.as_bytes());
        Ok(mac)
    }

    fn tag(&self, nonce: &str) -> anyhow::Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.mac(nonce)?.finalize().into_bytes()))
    }

    pub fn issue(&self) -> anyhow::Result<String> {
        let nonce = generate_token(MIN_TOKEN_BYTES)?;
        let tag = self.tag(&nonce)?;
        Ok(format!("{nonce}.{tag}"))
    }

    /// True when `token` was produced by [`CsrfKey::issue`] with this key.
    pub fn is_valid(&self, token: &str) -> bool {
        let Some((nonce, tag)) = token.split_once('.') else {
            return false;
        };
        if nonce.is_empty() {
            return false;
        }
        let Ok(tag) = URL_SAFE_NO_PAD.decode(tag) else {
            return false;
        };
        self.mac(nonce)
            .is_ok_and(|mac| mac.verify_slice(&tag).is_ok())
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Reject unsafe requests whose header does not match a genuine cookie;
/// hand out a cookie on safe requests that arrive without one.
pub async fn protect(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let existing = cookie_value(req.headers(), CSRF_COOKIE_NAME).filter(|t| state.csrf.is_valid(t));

    if !is_safe(req.method()) {
        let header = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let ok = existing
            .as_deref()
            .is_some_and(|cookie| constant_time_eq(cookie.as_bytes(), header.as_bytes()));
        if !ok {
            warn!(method = %req.method(), path = %req.uri().path(), "csrf check failed");
            return (StatusCode::FORBIDDEN, "invalid anti-forgery token").into_response();
        }
    }

    let (token, fresh) = match existing {
        Some(t) => (t, false),
        None => match state.csrf.issue() {
            Ok(t) => (t, true),
            Err(e) => {
                error!(error = %e, "csrf token generation failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
            }
        },
    };
    req.extensions_mut().insert(CsrfToken(token.clone()));

    let mut res = next.run(req).await;
    if fresh {
        match csrf_cookie(&token, state.config.session.cookie_secure) {
            Ok(cookie) => {
                res.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(e) => error!(error = %e, "csrf cookie header"),
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_validate_under_same_key_only() {
        let key = CsrfKey::new(b"key-one");
        let token = key.issue().unwrap();
        assert!(key.is_valid(&token));
        assert!(!CsrfKey::new(b"key-two").is_valid(&token));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let key = CsrfKey::new(b"key");
        let token = key.issue().unwrap();
        let (nonce, _) = token.split_once('.').unwrap();
        assert!(!key.is_valid(""));
        assert!(!key.is_valid(nonce));
        assert!(!key.is_valid(&format!("{nonce}.forged")));
        assert!(!key.is_valid(&format!(".{}", key.tag("").unwrap())));
    }

    #[test]
    fn tag_is_hmac_not_keyed_prefix_hash() {
        use sha2::Digest;

        let key = CsrfKey::new(b"key");
        let token = key.issue().unwrap();
        let (nonce, tag) = token.split_once('.').unwrap();

        let mut expected = HmacSha256::new_from_slice(b"key").unwrap();
        expected.update(nonce.as_bytes());
        assert_eq!(
            URL_SAFE_NO_PAD.decode(tag).unwrap(),
            expected.finalize().into_bytes().to_vec()
        );

        let mut prefixed = Sha256::new();
        prefixed.update(b"key");
        prefixed.update(nonce.as_bytes());
        let forged = format!("{nonce}.{}", URL_SAFE_NO_PAD.encode(prefixed.finalize()));
        assert!(!key.is_valid(&forged));
    }

    #[test]
    fn random_keys_differ() {
        let a = CsrfKey::random().unwrap();
        let b = CsrfKey::random().unwrap();
        let token = a.issue().unwrap();
        assert!(!b.is_valid(&token));
    }

    #[test]
    fn safe_methods() {
        assert!(is_safe(&Method::GET));
        assert!(is_safe(&Method::HEAD));
        assert!(!is_safe(&Method::POST));
        assert!(!is_safe(&Method::DELETE));
    }
}
