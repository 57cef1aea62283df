//! API layer for the relay.
//!
//! This module contains the access guard, HTTP handlers, request/response
//! models, and router assembly.

pub mod auth;
pub mod handlers;
pub mod models;
pub mod routes;

// Re-export commonly used types
pub use auth::AccessGuard;
pub use handlers::{
    chat, end_session, health, metrics_handler, send_message, start_session, AppState,
};
pub use models::{
    ChatRequest, ConversationTurn, EndSessionRequest, EndSessionResponse, HealthResponse,
    ReplyResponse, SendMessageRequest, SessionId, StartSessionResponse,
};
pub use routes::{build_router, cors_layer};
