//! Performance summary and incremental web-vitals tracking
//!
//! Two sources feed this adapter: a one-shot navigation/paint timing snapshot
//! available after load completion, and a continuous observer stream of
//! web-vitals entries (largest-contentful-paint, first-input-delay,
//! cumulative-layout-shift). The summary is retained so every outgoing batch
//! can carry the latest copy.

use serde_json::json;

use super::PaintTiming;

/// Tracks the one-shot performance summary and the running web-vitals state.
#[derive(Debug, Default)]
pub struct VitalsTracker {
    summary: Option<serde_json::Value>,
    summary_emitted: bool,
    cumulative_layout_shift: f64,
}

impl VitalsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record load completion. Returns `performance` event properties the
    /// first time only; later load signals are ignored.
    pub fn on_load_complete(&mut self, timing: &PaintTiming) -> Option<serde_json::Value> {
        if self.summary_emitted {
            return None;
        }
        self.summary_emitted = true;

        let summary = json!({
            "dns_ms": timing.dns_ms,
            "tcp_ms": timing.tcp_ms,
            "ttfb_ms": timing.ttfb_ms,
            "dom_content_loaded_ms": timing.dom_content_loaded_ms,
            "load_ms": timing.load_ms,
            "first_paint_ms": timing.first_paint_ms,
            "first_contentful_paint_ms": timing.first_contentful_paint_ms,
        });
        self.summary = Some(summary.clone());
        Some(summary)
    }

    /// `web_vital` properties for a largest-contentful-paint observation
    pub fn on_largest_contentful_paint(&self, value_ms: f64) -> serde_json::Value {
        json!({ "metric": "lcp", "value": value_ms })
    }

    /// `web_vital` properties for a first-input-delay observation
    pub fn on_first_input_delay(&self, value_ms: f64) -> serde_json::Value {
        json!({ "metric": "fid", "value": value_ms })
    }

    /// Fold one layout-shift batch into the running cumulative score and
    /// return a single `cls` update for it.
    pub fn on_layout_shift(&mut self, score: f64) -> serde_json::Value {
        self.cumulative_layout_shift += score;
        json!({ "metric": "cls", "value": self.cumulative_layout_shift })
    }

    /// Latest performance summary, if load has completed
    pub fn summary(&self) -> Option<&serde_json::Value> {
        self.summary.as_ref()
    }
}
