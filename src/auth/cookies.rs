use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

pub const SESSION_COOKIE_NAME: &str = "lenslock_session";
pub const CSRF_COOKIE_NAME: &str = "lenslock_csrf";

/// Find a cookie by name across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, val)| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn build(name: &str, value: &str, http_only: bool, secure: bool, max_age: Option<i64>) -> String {
    let mut cookie = format!("{name}={value}; Path=/; SameSite=Lax");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if let Some(secs) = max_age {
        cookie.push_str(&format!("; Max-Age={secs}"));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Browser-session cookie carrying the plaintext session token.
pub fn session_cookie(token: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&build(SESSION_COOKIE_NAME, token, true, secure, None))
}

pub fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&build(SESSION_COOKIE_NAME, "", true, secure, Some(0)))
}

/// Readable by page scripts so they can echo it in the anti-forgery header.
pub fn csrf_cookie(token: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&build(CSRF_COOKIE_NAME, token, false, secure, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; lenslock_session=abc123 ; other=1"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE_NAME).as_deref(),
            Some("abc123")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn cookie_value_scans_multiple_headers_and_ignores_empty() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("lenslock_session="));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE_NAME), None);
        headers.append(COOKIE, HeaderValue::from_static("lenslock_csrf=n.t"));
        assert_eq!(cookie_value(&headers, CSRF_COOKIE_NAME).as_deref(), Some("n.t"));
    }

    #[test]
    fn session_cookie_attributes() {
        let insecure = session_cookie("tok", false).unwrap();
        let insecure = insecure.to_str().unwrap();
        assert!(insecure.starts_with("lenslock_session=tok;"));
        assert!(insecure.contains("HttpOnly"));
        assert!(insecure.contains("SameSite=Lax"));
        assert!(!insecure.contains("Secure"));

        let secure = session_cookie("tok", true).unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cleared = clear_session_cookie(false).unwrap();
        let cleared = cleared.to_str().unwrap();
        assert!(cleared.starts_with("lenslock_session=;"));
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn csrf_cookie_is_script_readable() {
        let c = csrf_cookie("n.t", false).unwrap();
        assert!(!c.to_str().unwrap().contains("HttpOnly"));
    }
}
