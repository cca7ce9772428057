//! Capture adapters: raw host-page signals in, events out
//!
//! Each adapter is independent and turns one class of raw environment signal
//! (pointer movement, clicks, scrolling, visibility, script errors, paint
//! timing) into zero or more events. The host binding pushes [`PageSignal`]s
//! onto a single-consumer channel; the pipeline consumes them in arrival
//! order, which preserves event ordering without a shared lock.
//!
//! Signals carry their own timestamps so the sliding-window detectors can be
//! driven with fabricated clocks in tests.

mod heatmap;
mod rage;
mod scroll;
mod vitals;

pub use heatmap::HeatmapSampler;
pub use rage::{RageClick, RageClickDetector};
pub use scroll::scroll_milestone;
pub use vitals::VitalsTracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw inbound signal from the host page.
#[derive(Debug, Clone)]
pub enum PageSignal {
    /// Pointer click at device-pixel coordinates
    Click {
        x: f64,
        y: f64,
        /// CSS selector or tag description of the click target
        target: String,
        at: DateTime<Utc>,
    },

    /// Pointer movement (feeds the heatmap sampler)
    PointerMove { x: f64, y: f64, at: DateTime<Utc> },

    /// Scroll position update
    Scroll {
        scroll_y: f64,
        scroll_height: f64,
        viewport_height: f64,
    },

    /// A form field changed. Only identity, type and value length are
    /// captured; the raw value never enters the pipeline.
    FieldChange {
        field: String,
        field_type: String,
        value_len: usize,
    },

    /// Page visibility changed
    VisibilityChange { hidden: bool },

    /// Script or resource error
    ScriptError {
        message: String,
        source: String,
        line: u32,
        column: u32,
    },

    /// Unhandled promise rejection
    UnhandledRejection { reason: String },

    /// Page load completed; navigation/paint timing is final
    LoadComplete { timing: PaintTiming },

    /// Largest-contentful-paint observation (milliseconds)
    LargestContentfulPaint { value_ms: f64 },

    /// First-input-delay observation (milliseconds)
    FirstInputDelay { value_ms: f64 },

    /// One batch of layout-shift entries, pre-summed by the observer.
    /// The pipeline emits at most one `cls` update per batch.
    LayoutShift { score: f64 },

    /// Connectivity changed; `online = true` triggers an offline-queue resync
    ConnectivityChange { online: bool },

    /// Page teardown; drives session end and the forced terminal flush
    Teardown,
}

/// Navigation and paint timing collected once after load completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaintTiming {
    pub dns_ms: f64,
    pub tcp_ms: f64,
    pub ttfb_ms: f64,
    pub dom_content_loaded_ms: f64,
    pub load_ms: f64,
    pub first_paint_ms: f64,
    pub first_contentful_paint_ms: f64,
}
