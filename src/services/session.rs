//! In-memory registry of multi-turn chat sessions.
//!
//! Each session owns the accumulated conversation it replays to the upstream
//! on every message. Handles come from a monotonically increasing counter and
//! are never reused.
//!
//! Locking: the handle map sits behind one short-held mutex that is never held
//! across an upstream call; each session additionally has its own async mutex
//! so concurrent messages to the same handle are applied one at a time.

use crate::api::models::SessionId;
use crate::core::config::SessionConfig;
use crate::core::error::{AppError, Result, DETAIL_SESSION_NOT_FOUND};
use crate::core::metrics::get_metrics;
use crate::services::upstream::{
    parse_body, record_failure, RelayMode, UpstreamClient, UpstreamFailure,
};
use crate::transformer::gemini::{extract_reply, Content};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Upper bound on the sweeper interval.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Upstream conversational context of one session.
#[derive(Debug, Default)]
pub struct ChatContext {
    history: Vec<Content>,
}

impl ChatContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed exchanges so far, oldest first.
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Send one message and return the reply.
    ///
    /// The history only grows when the upstream produced reply text. A success
    /// response without text is returned verbatim; failures come back as
    /// diagnostic strings.
    pub async fn send(&mut self, upstream: &UpstreamClient, message: &str) -> String {
        let mut contents = self.history.clone();
        contents.push(Content::user(message));

        let body = match upstream.generate_content(contents, RelayMode::Session).await {
            Ok(body) => body,
            Err(failure) => {
                record_failure(RelayMode::Session, &failure);
                return failure.to_string();
            }
        };

        match parse_body(&body)
            .and_then(|value| extract_reply(&value).map_err(UpstreamFailure::from))
        {
            Ok(reply) => {
                self.history.push(Content::user(message));
                self.history.push(Content::model(reply.clone()));
                reply
            }
            Err(failure) => {
                record_failure(RelayMode::Session, &failure);
                body
            }
        }
    }
}

struct SessionSlot {
    context: tokio::sync::Mutex<ChatContext>,
    last_used: Mutex<Instant>,
}

impl SessionSlot {
    fn new(now: Instant) -> Self {
        Self {
            context: tokio::sync::Mutex::new(ChatContext::new()),
            last_used: Mutex::new(now),
        }
    }

    fn touch(&self) {
        *lock(&self.last_used) = Instant::now();
    }

    fn idle_since(&self) -> Instant {
        *lock(&self.last_used)
    }
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of live chat sessions.
pub struct SessionRegistry {
    upstream: Arc<UpstreamClient>,
    sessions: Mutex<HashMap<SessionId, Arc<SessionSlot>>>,
    next_id: AtomicU64,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(upstream: Arc<UpstreamClient>, config: SessionConfig) -> Self {
        Self {
            upstream,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    fn idle_timeout(&self) -> Option<Duration> {
        match self.config.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn publish_len(len: usize) {
        get_metrics().active_sessions.set(len as i64);
    }

    /// Open a new session and return its handle.
    ///
    /// At capacity, idle sessions are evicted first; if the registry is still
    /// full the call fails with [`AppError::SessionLimit`].
    pub fn create(&self) -> Result<SessionId> {
        let now = Instant::now();
        let mut sessions = lock(&self.sessions);

        if self.config.max_sessions > 0 && sessions.len() >= self.config.max_sessions {
            let evicted = self.evict_locked(&mut sessions, now);
            if evicted > 0 {
                tracing::info!(evicted, "Evicted idle sessions to make room");
            }
            if sessions.len() >= self.config.max_sessions {
                tracing::warn!(
                    max_sessions = self.config.max_sessions,
                    "Session limit reached; rejecting new session"
                );
                return Err(AppError::SessionLimit(self.config.max_sessions));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sessions.insert(id, Arc::new(SessionSlot::new(now)));
        Self::publish_len(sessions.len());

        tracing::info!(session_id = id, live = sessions.len(), "Session created");
        Ok(id)
    }

    /// Send a message to a live session and return the reply.
    pub async fn send(&self, id: SessionId, message: &str) -> Result<String> {
        let slot = lock(&self.sessions)
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(DETAIL_SESSION_NOT_FOUND.to_string()))?;

        slot.touch();
        let reply = {
            let mut context = slot.context.lock().await;
            context.send(&self.upstream, message).await
        };
        slot.touch();

        tracing::debug!(
            session_id = id,
            reply_chars = reply.chars().count(),
            "Session message relayed"
        );
        Ok(reply)
    }

    /// Discard a session. Idempotent: unknown handles also report success.
    pub fn delete(&self, id: SessionId) -> bool {
        let mut sessions = lock(&self.sessions);
        if sessions.remove(&id).is_some() {
            tracing::info!(session_id = id, live = sessions.len(), "Session deleted");
        }
        Self::publish_len(sessions.len());
        true
    }

    /// Whether a handle refers to a live session.
    pub fn contains(&self, id: SessionId) -> bool {
        lock(&self.sessions).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict sessions idle for longer than the configured timeout.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// Evict as if the current time were `now`.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = lock(&self.sessions);
        self.evict_locked(&mut sessions, now)
    }

    fn evict_locked(
        &self,
        sessions: &mut HashMap<SessionId, Arc<SessionSlot>>,
        now: Instant,
    ) -> usize {
        let Some(timeout) = self.idle_timeout() else {
            return 0;
        };

        let before = sessions.len();
        sessions.retain(|id, slot| {
            let keep = now.saturating_duration_since(slot.idle_since()) < timeout;
            if !keep {
                tracing::info!(session_id = *id, "Evicting idle session");
            }
            keep
        });
        Self::publish_len(sessions.len());
        before - sessions.len()
    }

    /// Spawn the background idle sweeper.
    ///
    /// Returns `None` when idle eviction is disabled. The task holds only a weak
    /// reference and exits once the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let timeout = self.idle_timeout()?;
        let period = timeout.min(MAX_SWEEP_INTERVAL);
        let registry: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_idle();
                if evicted > 0 {
                    tracing::debug!(evicted, live = registry.len(), "Idle sweep finished");
                }
            }
        }))
    }
}
