//! HTTP request handlers for the relay API.
//!
//! Each `/v1` handler runs the access guard before looking at the body, so an
//! unauthenticated caller gets 401 even when the body is also malformed.

use crate::api::auth::{token_fingerprint, AccessGuard};
use crate::api::models::*;
use crate::core::config::Settings;
use crate::core::{AppError, Result};
use crate::services::{SessionRegistry, UpstreamClient};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub access: AccessGuard,
    pub upstream: Arc<UpstreamClient>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(settings: Settings, http_client: reqwest::Client) -> Self {
        let settings = Arc::new(settings);
        let upstream = Arc::new(UpstreamClient::new(&settings, http_client));
        let sessions = Arc::new(SessionRegistry::new(upstream.clone(), settings.sessions));

        Self {
            access: AccessGuard::from_settings(&settings),
            settings,
            upstream,
            sessions,
        }
    }
}

/// Unwrap a JSON body, turning extractor rejections into 400s.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Stateless chat: relay a prompt plus optional history.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ReplyResponse>> {
    let token = state.access.check_request(&headers)?;
    let request = json_body(payload)?;
    let history = request.history.unwrap_or_default();

    tracing::debug!(
        client = %token_fingerprint(&token),
        history_len = history.len(),
        "Processing chat request"
    );

    let reply = state.upstream.generate(&request.prompt, &history).await;
    Ok(Json(ReplyResponse { reply }))
}

/// Open a new chat session.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StartSessionResponse>> {
    let token = state.access.check_request(&headers)?;
    let session_id = state.sessions.create()?;

    tracing::debug!(client = %token_fingerprint(&token), session_id, "Session started");
    Ok(Json(StartSessionResponse { session_id }))
}

/// Send one message within an existing session.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<ReplyResponse>> {
    let token = state.access.check_request(&headers)?;
    let request = json_body(payload)?;

    tracing::debug!(
        client = %token_fingerprint(&token),
        session_id = request.session_id,
        "Processing session message"
    );

    let reply = state
        .sessions
        .send(request.session_id, &request.message)
        .await?;
    Ok(Json(ReplyResponse { reply }))
}

/// Close a session. Unknown handles still report success.
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<EndSessionRequest>, JsonRejection>,
) -> Result<Json<EndSessionResponse>> {
    let token = state.access.check_request(&headers)?;
    let request = json_body(payload)?;

    let success = state.sessions.delete(request.session_id);
    tracing::debug!(
        client = %token_fingerprint(&token),
        session_id = request.session_id,
        "Session ended"
    );
    Ok(Json(EndSessionResponse { success }))
}

/// Liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.sessions.len(),
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(buffer.into())
        .map_err(|e| AppError::Internal(e.to_string()))
}
