//! Request principal extraction
//!
//! The core does not verify credentials; it only needs a principal name
//! for LFS lock ownership. The name is taken from the Basic Authorization
//! header when present, otherwise the principal is anonymous (empty).

use axum::http::{header, HeaderMap};
use base64::Engine;

pub fn principal(headers: &HeaderMap) -> String {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return String::new();
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return String::new();
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return String::new();
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return String::new();
    };
    text.split_once(':')
        .map(|(user, _)| user.to_string())
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(user: &str, pass: &str) -> HeaderMap {
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_principal_from_basic_auth() {
        assert_eq!(principal(&basic("alice", "secret")), "alice");
    }

    #[test]
    fn test_principal_missing_or_malformed() {
        assert_eq!(principal(&HeaderMap::new()), "");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token"),
        );
        assert_eq!(principal(&headers), "");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic not-base64!!!"),
        );
        assert_eq!(principal(&headers), "");
    }
}
