//! Logging setup and per-request context.
//!
//! The request ID lives in task-local storage so that logs emitted deep inside
//! the upstream client can be correlated without threading it through every call.

use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Timestamp formatter using the local timezone (respects `TZ`).
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Build the filter directive string.
///
/// Noise suppression for the HTTP stack is always appended so a bare
/// `RUST_LOG=trace` does not flood the output with hyper internals.
fn filter_directives(base: Option<String>) -> String {
    let base = base.unwrap_or_else(|| "info,gemini_relay=debug".to_string());
    format!("{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn", base)
}

/// Install the global tracing subscriber.
///
/// `NO_COLOR` disables ANSI escapes (useful when logging to a file).
pub fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::new(filter_directives(std::env::var("RUST_LOG").ok()));
    let no_color = std::env::var("NO_COLOR").is_ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_id() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();

        assert_eq!(id1.len(), 36);
        assert_ne!(id1, id2);
        assert_eq!(id1.split('-').count(), 5);
    }

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives(None),
            "info,gemini_relay=debug,hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn"
        );
        assert!(filter_directives(Some("trace".to_string())).starts_with("trace,hyper=warn"));
    }
}
