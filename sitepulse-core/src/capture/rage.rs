//! Sliding-window rage-click detection
//!
//! Many clicks, tight cluster, short time window: a heuristic signal for user
//! frustration. The window is purely derived state and never persisted.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// A detected rage click: how many clicks are in the window and how tightly
/// they cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RageClick {
    /// Clicks currently inside the trailing window
    pub count: usize,
    /// Bounding-box area of those clicks, in device-pixel units
    pub area: f64,
}

#[derive(Debug, Clone, Copy)]
struct ClickSample {
    x: f64,
    y: f64,
    at: DateTime<Utc>,
}

/// Detects bursts of near-stationary clicks inside a trailing time window.
///
/// On every click the window is pruned to the trailing interval; when it
/// holds at least `click_threshold` samples whose bounding-box area is below
/// `max_area`, a [`RageClick`] is reported. The threshold is a hard floor:
/// fewer clicks never trigger, no matter how dense.
#[derive(Debug)]
pub struct RageClickDetector {
    window: VecDeque<ClickSample>,
    window_ms: i64,
    click_threshold: usize,
    max_area: f64,
}

impl RageClickDetector {
    pub fn new(window_ms: u64, click_threshold: usize, max_area: f64) -> Self {
        Self {
            window: VecDeque::new(),
            window_ms: window_ms as i64,
            click_threshold,
            max_area,
        }
    }

    /// Record a click and report a rage click if the window now qualifies.
    ///
    /// Reports once per triggering click from the moment the threshold is
    /// first reached, so a sustained burst keeps reporting.
    pub fn observe(&mut self, x: f64, y: f64, at: DateTime<Utc>) -> Option<RageClick> {
        self.window.push_back(ClickSample { x, y, at });

        let cutoff = at - Duration::milliseconds(self.window_ms);
        while let Some(front) = self.window.front() {
            if front.at < cutoff {
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.window.len() < self.click_threshold {
            return None;
        }

        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for sample in &self.window {
            min_x = min_x.min(sample.x);
            max_x = max_x.max(sample.x);
            min_y = min_y.min(sample.y);
            max_y = max_y.max(sample.y);
        }

        let area = (max_x - min_x) * (max_y - min_y);
        if area < self.max_area {
            Some(RageClick {
                count: self.window.len(),
                area,
            })
        } else {
            None
        }
    }

    /// Clicks currently inside the window (after the last prune)
    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}
