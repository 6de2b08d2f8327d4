//! API key authentication.
//!
//! The credential comes from `X-API-Key`, or failing that from
//! `Authorization` (with or without a `Bearer ` prefix), and must equal the
//! configured `API_KEY` byte for byte.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

use crate::error::GatewayError;
use crate::metrics::AUTH_FAILURES;

pub const X_API_KEY: &str = "x-api-key";
const BEARER_PREFIX: &str = "bearer ";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Pull the caller's credential out of the request headers.
///
/// A non-empty `X-API-Key` is taken verbatim and ends the lookup, even when
/// it is only whitespace (which yields no credential). An empty one falls
/// through to `Authorization`.
pub fn extract_credential(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = header_str(headers, X_API_KEY).filter(|v| !v.is_empty()) {
        return (!key.trim().is_empty()).then_some(key);
    }

    let value = header_str(headers, axum::http::header::AUTHORIZATION.as_str())?;
    let credential = match value.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
            value[BEARER_PREFIX.len()..].trim()
        }
        _ => value.trim(),
    };
    (!credential.is_empty()).then_some(credential)
}

// Identity for rate limiting: the key, else the caller's IP
pub fn resolve_identity(credential: Option<&str>, remote: SocketAddr) -> String {
    match credential {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => remote.ip().to_string(),
    }
}

// Short, stable tag for logs so raw keys never hit the output
pub fn fingerprint(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

/// Validates request credentials against the configured API key.
#[derive(Clone)]
pub struct Authenticator {
    api_key: String,
}

impl Authenticator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    // An empty configured key disables every protected endpoint
    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<String, GatewayError> {
        match extract_credential(headers) {
            Some(key) if self.is_enabled() && key == self.api_key => Ok(key.to_string()),
            presented => {
                AUTH_FAILURES.inc();
                tracing::debug!(
                    credential_present = presented.is_some(),
                    key_configured = self.is_enabled(),
                    "rejecting request: invalid or missing API key"
                );
                Err(GatewayError::unauthorized())
            }
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn no_headers_means_no_credential() {
        assert_eq!(extract_credential(&HeaderMap::new()), None);
        let auth = Authenticator::new("secret");
        assert!(auth.authenticate(&HeaderMap::new()).is_err());
    }

    #[test]
    fn bearer_remainder_is_trimmed() {
        let h = headers(&[("authorization", "Bearer  abc123  ")]);
        assert_eq!(extract_credential(&h), Some("abc123"));
    }

    #[test]
    fn bearer_prefix_is_case_insensitive() {
        let h = headers(&[("authorization", "bEaReR abc123")]);
        assert_eq!(extract_credential(&h), Some("abc123"));
    }

    #[test]
    fn authorization_without_scheme_is_used_whole() {
        let h = headers(&[("authorization", "  abc123 ")]);
        assert_eq!(extract_credential(&h), Some("abc123"));
        let h = headers(&[("authorization", "Token abc123")]);
        assert_eq!(extract_credential(&h), Some("Token abc123"));
    }

    #[test]
    fn x_api_key_wins_over_authorization() {
        let h = headers(&[("x-api-key", "from-header"), ("authorization", "Bearer from-auth")]);
        assert_eq!(extract_credential(&h), Some("from-header"));
    }

    #[test]
    fn x_api_key_is_verbatim() {
        let h = headers(&[("x-api-key", "Bearer abc")]);
        assert_eq!(extract_credential(&h), Some("Bearer abc"));
    }

    #[test]
    fn empty_x_api_key_falls_through() {
        let h = headers(&[("x-api-key", ""), ("authorization", "Bearer abc")]);
        assert_eq!(extract_credential(&h), Some("abc"));
    }

    #[test]
    fn whitespace_x_api_key_does_not_fall_through() {
        let h = headers(&[("x-api-key", "   "), ("authorization", "Bearer abc")]);
        assert_eq!(extract_credential(&h), None);
        assert!(Authenticator::new("abc").authenticate(&h).is_err());
    }

    #[test]
    fn whitespace_only_credentials_always_fail() {
        for h in [
            headers(&[("x-api-key", "   ")]),
            headers(&[("authorization", "Bearer    ")]),
            headers(&[("authorization", "   ")]),
        ] {
            assert_eq!(extract_credential(&h), None);
            assert!(Authenticator::new("   ").authenticate(&h).is_err());
            assert!(Authenticator::new("").authenticate(&h).is_err());
        }
    }

    #[test]
    fn empty_configured_key_always_fails() {
        let auth = Authenticator::new("");
        assert!(!auth.is_enabled());
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_static(""));
        assert!(auth.authenticate(&h).is_err());
        assert!(auth.authenticate(&headers(&[("x-api-key", "anything")])).is_err());
    }

    #[test]
    fn comparison_is_exact() {
        let auth = Authenticator::new("Secret");
        assert!(auth.authenticate(&headers(&[("x-api-key", "secret")])).is_err());
        assert!(auth.authenticate(&headers(&[("x-api-key", "Secret ")])).is_err());
        assert_eq!(
            auth.authenticate(&headers(&[("x-api-key", "Secret")])).unwrap(),
            "Secret"
        );
        assert_eq!(
            auth.authenticate(&headers(&[("authorization", "Bearer Secret")]))
                .unwrap(),
            "Secret"
        );
    }

    #[test]
    fn identity_falls_back_to_remote_ip() {
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        assert_eq!(resolve_identity(Some("k"), addr), "k");
        assert_eq!(resolve_identity(Some(""), addr), "10.1.2.3");
        assert_eq!(resolve_identity(None, addr), "10.1.2.3");
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        let a = fingerprint("abc123");
        assert_eq!(a.len(), 12);
        assert_eq!(a, fingerprint("abc123"));
        assert_ne!(a, fingerprint("abc124"));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let rendered = format!("{:?}", Authenticator::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
