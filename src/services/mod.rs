//! Business logic services for the relay.
//!
//! - [`upstream`]: single-shot Gemini calls with fail-soft diagnostics
//! - [`session`]: the in-memory chat session registry

pub mod session;
pub mod upstream;

// Re-export commonly used types
pub use session::{ChatContext, SessionRegistry};
pub use upstream::{create_http_client, RelayMode, UpstreamClient, UpstreamFailure};
