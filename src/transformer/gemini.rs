//! Gemini `generateContent` wire format.
//!
//! Builds request bodies from client conversation turns and pulls the reply
//! text back out of upstream responses.

use crate::api::models::ConversationTurn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Only the most recent turns of client history are forwarded.
pub const MAX_HISTORY_TURNS: usize = 20;

/// Per-turn content limit, in characters.
pub const MAX_CONTENT_CHARS: usize = 8000;

/// Fixed sampling temperature for every upstream call.
pub const TEMPERATURE: f32 = 0.7;

/// Wire role for the end user.
pub const ROLE_USER: &str = "user";

/// Wire role for the model (the "other speaker").
pub const ROLE_MODEL: &str = "model";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(ROLE_USER, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text(ROLE_MODEL, text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        }
    }
}

// ============================================================================
// Request Building
// ============================================================================

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Map a client role to the wire role. Anything but `user` speaks as the model.
pub fn map_role(role: &str) -> &'static str {
    if role == ROLE_USER {
        ROLE_USER
    } else {
        ROLE_MODEL
    }
}

/// Build the ordered turn list for a stateless call.
///
/// Keeps the last [`MAX_HISTORY_TURNS`] history entries, truncates every
/// content (prompt included) to [`MAX_CONTENT_CHARS`], and appends the prompt
/// as the final user turn.
pub fn build_contents(prompt: &str, history: &[ConversationTurn]) -> Vec<Content> {
    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);

    history
        .iter()
        .skip(skip)
        .map(|turn| {
            Content::text(
                map_role(&turn.role),
                truncate_chars(&turn.content, MAX_CONTENT_CHARS),
            )
        })
        .chain(std::iter::once(Content::user(truncate_chars(
            prompt,
            MAX_CONTENT_CHARS,
        ))))
        .collect()
}

// ============================================================================
// Response Extraction
// ============================================================================

/// Why a successful upstream response yielded no reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no candidates")]
    NoCandidates,

    #[error("empty response")]
    Empty,

    #[error("unexpected response format")]
    UnexpectedFormat,
}

/// Whether a JSON value carries nothing: null, false, zero, or an empty
/// string, array or object.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Extract the first candidate's text.
///
/// Non-blank `text` parts are joined with newlines and the result is trimmed.
/// A missing or blank `candidates` value is [`ExtractError::NoCandidates`].
/// Parts that are not objects and blank texts are skipped; anything else of
/// the wrong shape is [`ExtractError::UnexpectedFormat`].
pub fn extract_reply(body: &Value) -> Result<String, ExtractError> {
    let body = body.as_object().ok_or(ExtractError::UnexpectedFormat)?;

    let candidates = match body.get("candidates") {
        None => return Err(ExtractError::NoCandidates),
        Some(value) if is_blank(value) => return Err(ExtractError::NoCandidates),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ExtractError::UnexpectedFormat),
    };

    let first = candidates
        .first()
        .ok_or(ExtractError::NoCandidates)?
        .as_object()
        .ok_or(ExtractError::UnexpectedFormat)?;

    let parts = match first.get("content") {
        None => return Err(ExtractError::Empty),
        Some(Value::Object(content)) => match content.get("parts") {
            None => return Err(ExtractError::Empty),
            Some(Value::Array(parts)) => parts,
            Some(_) => return Err(ExtractError::UnexpectedFormat),
        },
        Some(_) => return Err(ExtractError::UnexpectedFormat),
    };

    let mut texts = Vec::with_capacity(parts.len());
    for part in parts.iter().filter_map(Value::as_object) {
        match part.get("text") {
            None => {}
            Some(value) if is_blank(value) => {}
            Some(Value::String(text)) => texts.push(text.as_str()),
            Some(_) => return Err(ExtractError::UnexpectedFormat),
        }
    }

    let reply = texts.join("\n").trim().to_string();
    if reply.is_empty() {
        Err(ExtractError::Empty)
    } else {
        Ok(reply)
    }
}
