//! Upstream Gemini client.
//!
//! Every call is a single attempt bounded by the configured timeout. Failures
//! never surface as errors: they become short diagnostic strings the frontend
//! can render, and the real failure kind goes to the log and metrics.

use crate::api::models::ConversationTurn;
use crate::core::config::Settings;
use crate::core::logging::get_request_id;
use crate::core::metrics::get_metrics;
use crate::transformer::gemini::{
    build_contents, extract_reply, Content, ExtractError, GenerateContentRequest,
};
use anyhow::Context;
use std::error::Error as _;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upstream body characters kept in an HTTP status diagnostic.
pub const MAX_ERROR_BODY_CHARS: usize = 300;

/// Header carrying the upstream API credential.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Which relay mode issued the upstream call (metrics label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Stateless,
    Session,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::Stateless => "chat",
            RelayMode::Session => "session",
        }
    }
}

/// Upstream failure, rendered with `Display` as the reply the client sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamFailure {
    #[error("[Backend] Missing GENIE_API_KEY; cannot contact Gemini.")]
    MissingKey,

    #[error("[Gemini error {status}] {body}")]
    HttpStatus { status: u16, body: String },

    #[error("[Gemini] Request timed out.")]
    Timeout,

    #[error("[Gemini] Request failed: {0}")]
    Transport(String),

    #[error("[Gemini] No candidates returned.")]
    NoCandidates,

    #[error("[Gemini] Empty response.")]
    Empty,

    #[error("[Gemini] Unexpected response format.")]
    UnexpectedFormat,
}

impl UpstreamFailure {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamFailure::MissingKey => "missing_key",
            UpstreamFailure::HttpStatus { .. } => "http_status",
            UpstreamFailure::Timeout => "timeout",
            UpstreamFailure::Transport(_) => "transport",
            UpstreamFailure::NoCandidates => "no_candidates",
            UpstreamFailure::Empty => "empty",
            UpstreamFailure::UnexpectedFormat => "unexpected_format",
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamFailure::Timeout
        } else {
            UpstreamFailure::Transport(describe_transport_error(err))
        }
    }
}

impl From<ExtractError> for UpstreamFailure {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NoCandidates => UpstreamFailure::NoCandidates,
            ExtractError::Empty => UpstreamFailure::Empty,
            ExtractError::UnexpectedFormat => UpstreamFailure::UnexpectedFormat,
        }
    }
}

/// Describe a transport error without the request URL.
fn describe_transport_error(err: &reqwest::Error) -> String {
    let mut message = if err.is_connect() {
        "connection error".to_string()
    } else if err.is_body() || err.is_decode() {
        "error reading response body".to_string()
    } else {
        "error sending request".to_string()
    };
    if let Some(source) = err.source() {
        message.push_str(": ");
        message.push_str(&source.to_string());
    }
    message
}

/// Record a fail-soft upstream failure on the log and metrics side-channel.
pub fn record_failure(mode: RelayMode, failure: &UpstreamFailure) {
    tracing::warn!(
        request_id = %get_request_id(),
        mode = mode.as_str(),
        kind = failure.kind(),
        detail = %failure,
        "Upstream call failed; returning diagnostic reply"
    );
    get_metrics()
        .upstream_failures
        .with_label_values(&[mode.as_str(), failure.kind()])
        .inc();
}

/// Build the shared HTTP client with connection pooling.
pub fn create_http_client(settings: &Settings) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

/// Client for the Gemini `generateContent` endpoint, shared by both relay modes.
#[derive(Clone)]
pub struct UpstreamClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(settings: &Settings, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    /// Relay a prompt with optional history and return the reply text.
    ///
    /// Never fails: every failure mode is returned as a diagnostic string.
    #[tracing::instrument(
        skip(self, prompt, history),
        fields(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            history_len = history.len()
        )
    )]
    pub async fn generate(&self, prompt: &str, history: &[ConversationTurn]) -> String {
        if self.api_key.is_none() {
            let failure = UpstreamFailure::MissingKey;
            record_failure(RelayMode::Stateless, &failure);
            return failure.to_string();
        }

        let contents = build_contents(prompt, history);
        let result = match self.generate_content(contents, RelayMode::Stateless).await {
            Ok(body) => parse_body(&body)
                .and_then(|value| extract_reply(&value).map_err(UpstreamFailure::from)),
            Err(failure) => Err(failure),
        };

        match result {
            Ok(reply) => reply,
            Err(failure) => {
                record_failure(RelayMode::Stateless, &failure);
                failure.to_string()
            }
        }
    }

    /// Issue one `generateContent` call and return the raw success body.
    ///
    /// Non-success statuses and transport errors come back as failures;
    /// recording them is left to the caller.
    pub async fn generate_content(
        &self,
        contents: Vec<Content>,
        mode: RelayMode,
    ) -> Result<String, UpstreamFailure> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamFailure::MissingKey)?;
        let payload = GenerateContentRequest::new(contents);
        let start = Instant::now();

        tracing::debug!(
            request_id = %get_request_id(),
            model = %self.model,
            turns = payload.contents.len(),
            mode = mode.as_str(),
            "Sending generateContent request"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    request_id = %get_request_id(),
                    model = %self.model,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    error_source = ?e.source(),
                    "HTTP request to upstream failed"
                );
                UpstreamFailure::from_reqwest(&e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamFailure::from_reqwest(&e))?;

        let elapsed = start.elapsed();
        get_metrics()
            .upstream_latency
            .with_label_values(&[mode.as_str()])
            .observe(elapsed.as_secs_f64());

        tracing::debug!(
            request_id = %get_request_id(),
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "Upstream request completed"
        );

        if !status.is_success() {
            return Err(UpstreamFailure::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(body)
    }
}

/// Parse a success body as JSON.
pub fn parse_body(body: &str) -> Result<serde_json::Value, UpstreamFailure> {
    serde_json::from_str(body).map_err(|_| UpstreamFailure::UnexpectedFormat)
}
