//! Core domain types for sitepulse
//!
//! These types form the normalized record shape that every captured signal is
//! converted into before it enters the pipeline.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Event** | One normalized observation (a click, an error, a page view) |
//! | **Critical event** | An Event in the fixed high-priority set; sent immediately in addition to normal batching |
//! | **Batch** | An ordered drain of the event buffer plus auxiliary data, handed to transport as one unit |
//! | **Flush** | Draining the buffer into a Batch |
//! | **Fast path** | Immediate per-event delivery that bypasses the periodic dispatcher |
//! | **Offline entry** | An undelivered payload parked in the bounded durable queue |
//!
//! Insertion order within a buffer is meaningful (it reconstructs a session
//! timeline) and is preserved through every stage of the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Critical classification
// ============================================

/// Event names that take the fast path in addition to normal batching.
pub const CRITICAL_EVENTS: &[&str] = &[
    "error",
    "session_start",
    "session_end",
    "conversion",
    "rage_click",
];

/// Whether an event name belongs to the fixed critical set.
pub fn is_critical(name: &str) -> bool {
    CRITICAL_EVENTS.contains(&name)
}

// ============================================
// Page context
// ============================================

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// The page context every event is stamped with at capture time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    /// Current page URL
    pub url: String,
    /// Document title
    pub title: String,
    /// Viewport size at capture time
    pub viewport: Viewport,
}

/// Host environment metadata attached to the `session_start` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub locale: String,
    pub referrer: String,
}

// ============================================
// Event
// ============================================

/// One normalized observation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Well-known event name (`page_view`, `error`, `rage_click`, ...)
    pub name: String,

    /// Event-specific properties (always a JSON object)
    pub properties: serde_json::Value,

    /// Session this event belongs to
    pub session_id: String,

    /// Identified user, if identity was known at capture time.
    /// Events captured before identification keep `None`; there is no
    /// retroactive backfill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// When the event was captured
    pub captured_at: DateTime<Utc>,

    /// Page context at capture time
    pub context: PageContext,
}

// ============================================
// Heatmap
// ============================================

/// One sampled pointer position for heatmap reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub x: f64,
    pub y: f64,
    pub at: DateTime<Utc>,
}

// ============================================
// Batch
// ============================================

/// An ordered drain of the event buffer, produced at flush time.
///
/// Ownership transfers to transport (or the offline queue) when the batch is
/// created; the buffer is cleared atomically with batch creation, so no event
/// can ever appear in two batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Events in capture order
    pub events: Vec<Event>,

    /// Session the batch was drained from
    pub session_id: String,

    /// User identity at flush time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// When the batch was produced
    pub produced_at: DateTime<Utc>,

    /// Latest one-shot performance summary, if load has completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_summary: Option<serde_json::Value>,

    /// Most recent pointer samples (at most the configured sample size)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub heatmap_sample: Vec<HeatmapPoint>,
}

// ============================================
// Offline queue
// ============================================

/// Payload parked in the offline queue when delivery fails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueuePayload {
    /// A full batch that failed periodic delivery
    Batch(Batch),
    /// A single critical event that failed the fast path
    Event(Event),
}

/// One entry in the bounded durable offline queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineEntry {
    pub payload: QueuePayload,
    pub enqueued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_set() {
        assert!(is_critical("error"));
        assert!(is_critical("session_start"));
        assert!(is_critical("session_end"));
        assert!(is_critical("conversion"));
        assert!(is_critical("rage_click"));
        assert!(!is_critical("page_view"));
        assert!(!is_critical("scroll_milestone"));
        assert!(!is_critical("web_vital"));
    }

    #[test]
    fn test_queue_payload_roundtrip() {
        let entry = OfflineEntry {
            payload: QueuePayload::Event(Event {
                name: "error".to_string(),
                properties: serde_json::json!({"message": "boom"}),
                session_id: "s-1".to_string(),
                user_id: None,
                captured_at: Utc::now(),
                context: PageContext {
                    url: "https://example.com/".to_string(),
                    title: "Example".to_string(),
                    viewport: Viewport {
                        width: 1280,
                        height: 720,
                    },
                },
            }),
            enqueued_at: Utc::now(),
        };

        let raw = serde_json::to_string(&entry).unwrap();
        let back: OfflineEntry = serde_json::from_str(&raw).unwrap();
        match back.payload {
            QueuePayload::Event(e) => assert_eq!(e.name, "error"),
            QueuePayload::Batch(_) => panic!("expected event payload"),
        }
    }
}
