//! Session lifetime and the anonymous-to-identified transition
//!
//! A session is created once per page lifetime. Identity may arrive later,
//! asynchronously, from the identity provider; events captured before
//! identification keep `user_id = None` and are never backfilled.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::types::Environment;

/// Generate a session id: millisecond timestamp plus a random suffix.
///
/// The time component keeps ids roughly sortable; the uuid suffix makes
/// collisions overwhelmingly improbable.
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.timestamp_millis(), Uuid::new_v4().simple())
}

/// Per-session activity counters, summarized in the `session_end` event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub page_views: u64,
    pub clicks: u64,
    pub scrolls: u64,
    pub errors: u64,
}

/// Owns session lifetime and identity state.
///
/// The pipeline stamps every event with this tracker's current session id and
/// user id, so the anonymous-to-identified cutover is exactly the point where
/// [`SessionTracker::identify`] is called.
#[derive(Debug)]
pub struct SessionTracker {
    id: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    user_id: Option<String>,
    counts: SessionCounts,
}

impl SessionTracker {
    /// Start a new session at `now`.
    pub fn start(now: DateTime<Utc>) -> Self {
        let id = generate_session_id(now);
        tracing::debug!(session_id = %id, "session started");
        Self {
            id,
            started_at: now,
            ended_at: None,
            user_id: None,
            counts: SessionCounts::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn counts(&self) -> SessionCounts {
        self.counts
    }

    /// Attach a user identity. Repeat calls overwrite; already-captured
    /// events are not restamped.
    pub fn identify(&mut self, user_id: &str) {
        tracing::debug!(session_id = %self.id, user_id = %user_id, "session identified");
        self.user_id = Some(user_id.to_string());
    }

    /// Drop the attached identity; subsequent events are anonymous again.
    pub fn anonymize(&mut self) {
        self.user_id = None;
    }

    /// Properties for the `session_start` event.
    pub fn start_properties(&self, env: &Environment) -> serde_json::Value {
        json!({
            "user_agent": env.user_agent,
            "screen_width": env.screen_width,
            "screen_height": env.screen_height,
            "locale": env.locale,
            "referrer": env.referrer,
        })
    }

    /// Terminate the session at `now` and return `session_end` properties.
    ///
    /// Returns `None` if the session already ended; a second teardown signal
    /// is a no-op.
    pub fn end(&mut self, now: DateTime<Utc>) -> Option<serde_json::Value> {
        if self.ended_at.is_some() {
            return None;
        }
        self.ended_at = Some(now);

        let duration_ms = (now - self.started_at).num_milliseconds();
        Some(json!({
            "session_duration": duration_ms,
            "page_views": self.counts.page_views,
            "clicks": self.counts.clicks,
            "scrolls": self.counts.scrolls,
            "errors": self.counts.errors,
        }))
    }

    pub fn count_page_view(&mut self) {
        self.counts.page_views += 1;
    }

    pub fn count_click(&mut self) {
        self.counts.clicks += 1;
    }

    pub fn count_scroll(&mut self) {
        self.counts.scrolls += 1;
    }

    pub fn count_error(&mut self) {
        self.counts.errors += 1;
    }
}
