/// Cookie helpers for the browser session
///
/// The session JWT travels in the `token` cookie and the OAuth CSRF state
/// in `oauth_state`. Both are `HttpOnly` and `SameSite=Lax` so the OAuth
/// redirect back from the provider still carries them.

use axum::http::{header, HeaderMap};

/// Session cookie name
pub const SESSION_COOKIE: &str = "token";

/// OAuth CSRF state cookie name
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Session cookie lifetime, matches the JWT lifetime
pub const SESSION_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// OAuth state cookie lifetime
pub const OAUTH_STATE_MAX_AGE_SECS: i64 = 10 * 60;

/// Builds a `Set-Cookie` header value
///
/// ```
/// use ispindel_shared::auth::cookie::session_cookie;
///
/// let value = session_cookie("token", "abc", 60, false);
/// assert_eq!(value, "token=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=60");
/// ```
pub fn session_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Builds a `Set-Cookie` value that removes the cookie
pub fn expired_cookie(name: &str) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        name
    )
}

/// Reads a cookie value from the request's `Cookie` headers
///
/// Empty values are treated as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_secure_flag() {
        let value = session_cookie(SESSION_COOKIE, "jwt", SESSION_MAX_AGE_SECS, true);
        assert!(value.ends_with("; Secure"));
        assert!(value.contains("Max-Age=86400"));
    }

    #[test]
    fn test_expired_cookie() {
        let value = expired_cookie(SESSION_COOKIE);
        assert!(value.starts_with("token=;"));
        assert!(value.contains("Max-Age=0"));
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=eyJhbGci.abc.def; oauth_state=xyz"),
        );

        assert_eq!(
            read_cookie(&headers, SESSION_COOKIE).as_deref(),
            Some("eyJhbGci.abc.def")
        );
        assert_eq!(read_cookie(&headers, OAUTH_STATE_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("token=t2"));

        assert_eq!(read_cookie(&headers, "token").as_deref(), Some("t2"));
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("token="));

        assert_eq!(read_cookie(&headers, "token"), None);
    }
}
