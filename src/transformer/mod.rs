//! Protocol transformers.
//!
//! Converts relay-level conversation data into upstream wire formats and back.

pub mod gemini;

pub use gemini::{
    build_contents, extract_reply, Content, ExtractError, GenerateContentRequest, Part,
};
