//! Configuration management for the relay.
//!
//! Settings are read once from the process environment at startup and shared
//! as an immutable [`Settings`] value for the lifetime of the process.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt;

/// Default upstream model when `GEMINI_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default upstream base URL when `GEMINI_API_BASE` is unset.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Main application configuration.
#[derive(Clone)]
pub struct Settings {
    /// Upstream API credential; `None` makes every upstream call fail soft
    pub api_key: Option<String>,

    /// Bearer tokens accepted from clients
    pub client_tokens: HashSet<String>,

    /// Lowercase origin prefixes; empty allows every origin
    pub allowed_origins: Vec<String>,

    /// Upstream model identifier
    pub model: String,

    /// Upstream base URL (without trailing slash)
    pub api_base: String,

    /// Server configuration (host, port)
    pub server: ServerConfig,

    /// Upstream request timeout in seconds, applied to both relay modes
    pub request_timeout_secs: u64,

    /// Session registry limits
    pub sessions: SessionConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Limits for the in-memory session registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum live sessions; `0` disables the bound
    pub max_sessions: usize,

    /// Idle time after which a session is evicted; `0` disables eviction
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    20
}

fn default_max_sessions() -> usize {
    1000
}

fn default_idle_timeout() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            client_tokens: HashSet::new(),
            allowed_origins: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            server: ServerConfig::default(),
            request_timeout_secs: default_request_timeout(),
            sessions: SessionConfig::default(),
        }
    }
}

// Keys and tokens never reach the logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("client_tokens", &self.client_tokens.len())
            .field("allowed_origins", &self.allowed_origins)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("server", &self.server)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Call `dotenvy::dotenv()` beforehand if a `.env` file should be honored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// # Examples
    ///
    /// ```
    /// use gemini_relay::core::config::Settings;
    ///
    /// let settings = Settings::from_lookup(|key| match key {
    ///     "VALID_CLIENT_TOKENS" => Some("alpha, beta".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert!(settings.client_tokens.contains("beta"));
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        settings.api_key = lookup("GENIE_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        settings.client_tokens = split_list(lookup("VALID_CLIENT_TOKENS").as_deref())
            .into_iter()
            .collect();

        settings.allowed_origins = split_list(lookup("ALLOWED_ORIGINS").as_deref())
            .into_iter()
            .map(|o| o.to_lowercase())
            .collect();

        if let Some(model) = non_empty(lookup("GEMINI_MODEL")) {
            settings.model = model;
        }

        if let Some(base) = non_empty(lookup("GEMINI_API_BASE")) {
            settings.api_base = base.trim_end_matches('/').to_string();
        }

        if let Some(host) = non_empty(lookup("HOST")) {
            settings.server.host = host;
        }

        if let Some(port) = non_empty(lookup("PORT")) {
            settings.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        if let Some(timeout) = non_empty(lookup("REQUEST_TIMEOUT_SECS")) {
            settings.request_timeout_secs = timeout
                .parse()
                .with_context(|| format!("Invalid REQUEST_TIMEOUT_SECS value: {}", timeout))?;
            anyhow::ensure!(
                settings.request_timeout_secs > 0,
                "Invalid REQUEST_TIMEOUT_SECS value: {} (must be at least 1)",
                timeout
            );
        }

        if let Some(max) = non_empty(lookup("MAX_SESSIONS")) {
            settings.sessions.max_sessions = max
                .parse()
                .with_context(|| format!("Invalid MAX_SESSIONS value: {}", max))?;
        }

        if let Some(idle) = non_empty(lookup("SESSION_IDLE_TIMEOUT_SECS")) {
            settings.sessions.idle_timeout_secs = idle
                .parse()
                .with_context(|| format!("Invalid SESSION_IDLE_TIMEOUT_SECS value: {}", idle))?;
        }

        Ok(settings)
    }

    /// Whether an upstream credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert!(settings.api_key.is_none());
        assert!(settings.client_tokens.is_empty());
        assert!(settings.allowed_origins.is_empty());
        assert_eq!(settings.model, "gemini-2.0-flash");
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.server, ServerConfig::default());
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.request_timeout_secs, 20);
        assert_eq!(settings.sessions.max_sessions, 1000);
        assert_eq!(settings.sessions.idle_timeout_secs, 3600);
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(Some(" a , ,b,, c ")),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_list(Some("")).is_empty());
        assert!(split_list(Some(" , ,")).is_empty());
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_tokens_and_origins_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("VALID_CLIENT_TOKENS", "tok-1, tok-2"),
            ("ALLOWED_ORIGINS", "https://App.Example.com , http://localhost:3000"),
        ]))
        .unwrap();

        assert_eq!(settings.client_tokens.len(), 2);
        assert!(settings.client_tokens.contains("tok-1"));
        assert!(settings.client_tokens.contains("tok-2"));
        assert_eq!(
            settings.allowed_origins,
            vec![
                "https://app.example.com".to_string(),
                "http://localhost:3000".to_string()
            ]
        );
    }

    #[test]
    fn test_tokens_keep_case() {
        let settings =
            Settings::from_lookup(lookup_from(&[("VALID_CLIENT_TOKENS", "MixedCase")])).unwrap();
        assert!(settings.client_tokens.contains("MixedCase"));
        assert!(!settings.client_tokens.contains("mixedcase"));
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let settings = Settings::from_lookup(lookup_from(&[("GENIE_API_KEY", "   ")])).unwrap();
        assert!(!settings.has_api_key());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("GENIE_API_KEY", "secret"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
            ("GEMINI_API_BASE", "http://localhost:9999/v1beta/"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("MAX_SESSIONS", "0"),
            ("SESSION_IDLE_TIMEOUT_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.model, "gemini-1.5-pro");
        assert_eq!(settings.api_base, "http://localhost:9999/v1beta");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.request_timeout_secs, 5);
        assert_eq!(settings.sessions.max_sessions, 0);
        assert_eq!(settings.sessions.idle_timeout_secs, 120);
    }

    #[test]
    fn test_invalid_port_is_error() {
        let result = Settings::from_lookup(lookup_from(&[("PORT", "not-a-port")]));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("PORT"));
    }

    #[test]
    fn test_zero_request_timeout_is_error() {
        let result = Settings::from_lookup(lookup_from(&[("REQUEST_TIMEOUT_SECS", "0")]));
        assert!(result.unwrap_err().to_string().contains("REQUEST_TIMEOUT_SECS"));

        let settings =
            Settings::from_lookup(lookup_from(&[("REQUEST_TIMEOUT_SECS", "1")])).unwrap();
        assert_eq!(settings.request_timeout_secs, 1);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("GENIE_API_KEY", "super-secret-key"),
            ("VALID_CLIENT_TOKENS", "client-secret"),
        ]))
        .unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("client-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        unsafe {
            std::env::set_var("VALID_CLIENT_TOKENS", "env-token");
            std::env::set_var("ALLOWED_ORIGINS", "HTTPS://ENV.EXAMPLE");
            std::env::remove_var("PORT");
        }

        let settings = Settings::from_env().unwrap();
        assert!(settings.client_tokens.contains("env-token"));
        assert_eq!(settings.allowed_origins, vec!["https://env.example".to_string()]);

        unsafe {
            std::env::remove_var("VALID_CLIENT_TOKENS");
            std::env::remove_var("ALLOWED_ORIGINS");
        }
    }
}
