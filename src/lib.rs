//! Gemini Relay - an authenticated relay between frontend clients and Google Gemini
//!
//! The relay validates a bearer token and the request origin, forwards prompts
//! to the upstream model, and returns the generated text. It offers two modes:
//!
//! - **Stateless chat**: prompt plus client-held history, one upstream call
//! - **Sessions**: an in-memory registry of multi-turn conversations keyed by handle
//!
//! Upstream failures are never surfaced as HTTP errors. They come back as short
//! diagnostic replies and are recorded on the log and metrics side-channel.
//!
//! # Architecture
//!
//! - [`core`]: configuration, errors, logging, metrics, middleware
//! - [`api`]: access guard, HTTP handlers, models, router
//! - [`services`]: upstream client and session registry
//! - [`transformer`]: Gemini wire format
//!
//! # Configuration
//!
//! Environment variables (a `.env` file is honored):
//! - `GENIE_API_KEY`: upstream API key
//! - `VALID_CLIENT_TOKENS`: comma-separated accepted bearer tokens
//! - `ALLOWED_ORIGINS`: comma-separated origin prefixes (empty allows all)
//! - `GEMINI_MODEL`: upstream model (default: gemini-2.0-flash)
//! - `GEMINI_API_BASE`: upstream base URL
//! - `HOST` / `PORT`: bind address (default: 0.0.0.0:8000)
//! - `REQUEST_TIMEOUT_SECS`: upstream timeout for both modes (default: 20)
//! - `MAX_SESSIONS`: session capacity, 0 for unbounded (default: 1000)
//! - `SESSION_IDLE_TIMEOUT_SECS`: idle eviction, 0 to disable (default: 3600)

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{build_router, AccessGuard, AppState, ChatRequest, ConversationTurn, ReplyResponse};
pub use core::{AppError, Result, Settings};
pub use services::{SessionRegistry, UpstreamClient};
