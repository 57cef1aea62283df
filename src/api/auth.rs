//! Access guard: bearer-token authentication and origin allow-listing.
//!
//! Every relay endpoint runs [`AccessGuard::check_request`] before touching the
//! request body: authentication first (401), then the origin check (403).

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::error::{
    AppError, Result, DETAIL_FORBIDDEN_ORIGIN, DETAIL_INVALID_HEADER, DETAIL_INVALID_TOKEN,
};

/// Authorization scheme prefix, matched case-insensitively.
const BEARER_PREFIX: &str = "bearer ";

// ============================================================================
// Helper Functions
// ============================================================================

/// Short SHA-256 fingerprint of a token, safe to put in logs.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(&hasher.finalize()[..4])
}

/// Read a header as UTF-8 text; non-text values count as absent.
fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Access Guard
// ============================================================================

/// Immutable credential and origin allow-lists.
#[derive(Clone)]
pub struct AccessGuard {
    tokens: Arc<HashSet<String>>,
    origins: Arc<Vec<String>>,
}

impl AccessGuard {
    /// Build a guard; origin prefixes are lowercased.
    pub fn new(tokens: HashSet<String>, origins: Vec<String>) -> Self {
        Self {
            tokens: Arc::new(tokens),
            origins: Arc::new(origins.into_iter().map(|o| o.to_lowercase()).collect()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.client_tokens.clone(),
            settings.allowed_origins.clone(),
        )
    }

    /// Whether the origin check is disabled (no allow-list configured).
    pub fn allows_all_origins(&self) -> bool {
        self.origins.is_empty()
    }

    /// Validate an `Authorization` header value and return the bearer token.
    ///
    /// # Examples
    ///
    /// ```
    /// use gemini_relay::api::auth::AccessGuard;
    ///
    /// let guard = AccessGuard::new(["tok".to_string()].into_iter().collect(), vec![]);
    /// assert_eq!(guard.authenticate(Some("bearer tok")).unwrap(), "tok");
    /// assert!(guard.authenticate(Some("Basic tok")).is_err());
    /// ```
    pub fn authenticate(&self, header_value: Option<&str>) -> Result<String> {
        let header_value = header_value
            .ok_or_else(|| AppError::Unauthorized(DETAIL_INVALID_HEADER.to_string()))?;

        let scheme = header_value.get(..BEARER_PREFIX.len());
        if !scheme.is_some_and(|s| s.eq_ignore_ascii_case(BEARER_PREFIX)) {
            return Err(AppError::Unauthorized(DETAIL_INVALID_HEADER.to_string()));
        }

        let token = header_value[BEARER_PREFIX.len()..].trim();
        if !self.tokens.contains(token) {
            tracing::debug!(
                token_fingerprint = %token_fingerprint(token),
                "Rejected unknown client token"
            );
            return Err(AppError::Unauthorized(DETAIL_INVALID_TOKEN.to_string()));
        }

        Ok(token.to_string())
    }

    /// Check a single origin value against the allow-list (prefix match).
    ///
    /// An entry of `https://example.com` also admits `https://example.com.evil.org`;
    /// prefix matching is the configured contract, not exact host matching.
    pub fn origin_allowed(&self, value: &str) -> bool {
        if self.origins.is_empty() {
            return true;
        }
        let value = value.to_lowercase();
        self.origins.iter().any(|allowed| value.starts_with(allowed.as_str()))
    }

    /// Decide whether a request's origin is allowed.
    ///
    /// Uses `Origin`, falling back to `Referer` when it is absent or empty.
    pub fn authorize_origin(&self, origin: Option<&str>, referer: Option<&str>) -> bool {
        if self.origins.is_empty() {
            return true;
        }
        let candidate = origin
            .filter(|o| !o.is_empty())
            .or(referer)
            .unwrap_or("");
        self.origin_allowed(candidate)
    }

    /// Run both checks against request headers and return the client token.
    pub fn check_request(&self, headers: &HeaderMap) -> Result<String> {
        let token = self.authenticate(header_str(headers, &header::AUTHORIZATION))?;

        let origin = header_str(headers, &header::ORIGIN);
        let referer = header_str(headers, &header::REFERER);
        if !self.authorize_origin(origin, referer) {
            tracing::info!(
                token_fingerprint = %token_fingerprint(&token),
                origin = origin.unwrap_or(""),
                referer = referer.unwrap_or(""),
                "Rejected request from disallowed origin"
            );
            return Err(AppError::Forbidden(DETAIL_FORBIDDEN_ORIGIN.to_string()));
        }

        Ok(token)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn guard(tokens: &[&str], origins: &[&str]) -> AccessGuard {
        AccessGuard::new(
            tokens.iter().map(|t| t.to_string()).collect(),
            origins.iter().map(|o| o.to_string()).collect(),
        )
    }

    #[test]
    fn test_token_fingerprint() {
        let fp = token_fingerprint("sk-test-key-123");
        assert_eq!(fp.len(), 8);
        assert_eq!(fp, token_fingerprint("sk-test-key-123"));
        assert_ne!(fp, token_fingerprint("different-key"));
    }

    #[test]
    fn test_authenticate_valid_token() {
        let g = guard(&["tok-1", "tok-2"], &[]);
        assert_eq!(g.authenticate(Some("Bearer tok-1")).unwrap(), "tok-1");
        assert_eq!(g.authenticate(Some("Bearer tok-2")).unwrap(), "tok-2");
    }

    #[test]
    fn test_authenticate_scheme_case_insensitive() {
        let g = guard(&["tok"], &[]);
        assert_eq!(g.authenticate(Some("bearer tok")).unwrap(), "tok");
        assert_eq!(g.authenticate(Some("BEARER tok")).unwrap(), "tok");
        assert_eq!(g.authenticate(Some("BeArEr tok")).unwrap(), "tok");
    }

    #[test]
    fn test_authenticate_trims_token() {
        let g = guard(&["tok"], &[]);
        assert_eq!(g.authenticate(Some("Bearer   tok  ")).unwrap(), "tok");
    }

    #[test]
    fn test_authenticate_missing_or_malformed() {
        let g = guard(&["tok"], &[]);
        for header in [
            None,
            Some(""),
            Some("Bearer"),
            Some("Bearertok"),
            Some("Basic dXNlcjpwYXNz"),
            Some("tok"),
            Some("Token tok"),
        ] {
            assert_matches!(
                g.authenticate(header),
                Err(AppError::Unauthorized(ref detail)) if detail == DETAIL_INVALID_HEADER,
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_authenticate_unknown_token() {
        let g = guard(&["tok"], &[]);
        for header in ["Bearer other", "Bearer TOK", "Bearer ", "Bearer tok2"] {
            assert_matches!(
                g.authenticate(Some(header)),
                Err(AppError::Unauthorized(ref detail)) if detail == DETAIL_INVALID_TOKEN
            );
        }
    }

    #[test]
    fn test_authenticate_empty_allow_list_rejects() {
        let g = guard(&[], &[]);
        assert!(g.authenticate(Some("Bearer anything")).is_err());
    }

    #[test]
    fn test_authenticate_multibyte_header() {
        let g = guard(&["tok"], &[]);
        assert!(g.authenticate(Some("ßearer tok")).is_err());
    }

    #[test]
    fn test_origin_empty_allow_list_allows_all() {
        let g = guard(&["tok"], &[]);
        assert!(g.allows_all_origins());
        assert!(g.authorize_origin(None, None));
        assert!(g.authorize_origin(Some("https://anything.example"), None));
        assert!(g.authorize_origin(None, Some("http://x")));
    }

    #[test]
    fn test_origin_prefix_match() {
        let g = guard(&["tok"], &["https://a.com"]);
        assert!(g.authorize_origin(Some("https://a.com"), None));
        assert!(g.authorize_origin(Some("https://a.com/page"), None));
        assert!(g.authorize_origin(Some("HTTPS://A.COM"), None));
        assert!(!g.authorize_origin(Some("https://b.com"), None));
        assert!(!g.authorize_origin(None, None));
    }

    #[test]
    fn test_origin_prefix_match_admits_suffix_hosts() {
        let g = guard(&["tok"], &["https://example.com"]);
        assert!(g.authorize_origin(Some("https://example.com.evil.org"), None));
    }

    #[test]
    fn test_origin_falls_back_to_referer() {
        let g = guard(&["tok"], &["https://a.com"]);
        assert!(g.authorize_origin(None, Some("https://a.com/some/page")));
        assert!(g.authorize_origin(Some(""), Some("https://a.com/some/page")));
        assert!(!g.authorize_origin(None, Some("https://b.com/")));
        // Origin wins over Referer when both are present
        assert!(!g.authorize_origin(Some("https://b.com"), Some("https://a.com/")));
    }

    #[test]
    fn test_allow_list_entries_lowercased() {
        let g = guard(&["tok"], &["HTTPS://UPPER.EXAMPLE"]);
        assert!(g.authorize_origin(Some("https://upper.example"), None));
    }

    #[test]
    fn test_check_request_order() {
        let g = guard(&["tok"], &["https://a.com"]);

        // Bad token and bad origin: authentication fails first
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
        headers.insert(header::ORIGIN, "https://b.com".parse().unwrap());
        assert_matches!(g.check_request(&headers), Err(AppError::Unauthorized(_)));

        // Good token, bad origin
        headers.insert(header::AUTHORIZATION, "Bearer tok".parse().unwrap());
        assert_matches!(g.check_request(&headers), Err(AppError::Forbidden(_)));

        // Good token, good origin
        headers.insert(header::ORIGIN, "https://a.com".parse().unwrap());
        assert_eq!(g.check_request(&headers).unwrap(), "tok");
    }
}
