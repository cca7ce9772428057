//! Probabilistic pointer sampling for heatmaps
//!
//! Raw pointer movement is far too chatty to ship. The sampler throttles
//! observations to one per tick, keeps a uniform random fraction of observed
//! ticks, and bounds the rolling buffer so memory stays flat no matter how
//! long the session runs. The buffer survives flushes; only a bounded sample
//! of the most recent points is attached to each outgoing batch.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::HeatmapPoint;

/// Rolling, bounded pointer sampler. Ephemeral by design: lost on page crash.
pub struct HeatmapSampler {
    points: VecDeque<HeatmapPoint>,
    last_tick: Option<DateTime<Utc>>,
    rng: StdRng,
    tick_ms: i64,
    keep_probability: f64,
    capacity: usize,
    sample_size: usize,
}

impl HeatmapSampler {
    pub fn new(tick_ms: u64, keep_probability: f64, capacity: usize, sample_size: usize) -> Self {
        Self::with_rng(
            tick_ms,
            keep_probability,
            capacity,
            sample_size,
            StdRng::from_entropy(),
        )
    }

    /// Construct with an explicit RNG for deterministic sampling in tests.
    pub fn with_rng(
        tick_ms: u64,
        keep_probability: f64,
        capacity: usize,
        sample_size: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            points: VecDeque::new(),
            last_tick: None,
            rng,
            tick_ms: tick_ms as i64,
            keep_probability,
            capacity,
            sample_size,
        }
    }

    /// Observe a pointer position.
    ///
    /// At most one observation per tick interval is considered; of those,
    /// a uniform fraction is retained. The oldest points are trimmed when
    /// the buffer exceeds its capacity.
    pub fn observe(&mut self, x: f64, y: f64, at: DateTime<Utc>) {
        if let Some(last) = self.last_tick {
            if at - last < Duration::milliseconds(self.tick_ms) {
                return;
            }
        }
        self.last_tick = Some(at);

        if self.rng.gen::<f64>() >= self.keep_probability {
            return;
        }

        self.points.push_back(HeatmapPoint { x, y, at });
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Clone of the most recent points, at most `sample_size`, for batch
    /// attachment. The buffer itself is not cleared.
    pub fn sample(&self) -> Vec<HeatmapPoint> {
        let skip = self.points.len().saturating_sub(self.sample_size);
        self.points.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Sampler that keeps every observed tick (probability 1.0)
    fn keep_all(capacity: usize, sample_size: usize) -> HeatmapSampler {
        HeatmapSampler::with_rng(100, 1.0, capacity, sample_size, StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_throttles_to_one_per_tick() {
        let mut s = keep_all(1000, 100);
        let start = Utc::now();

        // 10 moves inside a single 100ms tick
        for i in 0..10 {
            s.observe(i as f64, 0.0, start + Duration::milliseconds(i * 5));
        }
        assert_eq!(s.len(), 1);

        s.observe(99.0, 0.0, start + Duration::milliseconds(150));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_capacity_trims_oldest() {
        let mut s = keep_all(1000, 100);
        let start = Utc::now();

        for i in 0..1500 {
            s.observe(i as f64, 0.0, start + Duration::milliseconds(i * 100));
        }
        assert_eq!(s.len(), 1000);

        // Oldest 500 were trimmed
        let sample = s.sample();
        assert_eq!(sample.len(), 100);
        assert_eq!(sample.last().unwrap().x, 1499.0);
        assert_eq!(sample.first().unwrap().x, 1400.0);
    }

    #[test]
    fn test_sample_smaller_than_buffer() {
        let mut s = keep_all(1000, 100);
        let start = Utc::now();

        for i in 0..30 {
            s.observe(i as f64, 0.0, start + Duration::milliseconds(i * 100));
        }
        assert_eq!(s.sample().len(), 30);
        // Sampling does not drain the buffer
        assert_eq!(s.len(), 30);
    }

    #[test]
    fn test_zero_probability_keeps_nothing() {
        let mut s = HeatmapSampler::with_rng(100, 0.0, 1000, 100, StdRng::seed_from_u64(7));
        let start = Utc::now();
        for i in 0..50 {
            s.observe(i as f64, 0.0, start + Duration::milliseconds(i * 100));
        }
        assert!(s.is_empty());
    }

    #[test]
    fn test_probability_bounds_volume() {
        let mut s = HeatmapSampler::with_rng(100, 0.1, 1000, 100, StdRng::seed_from_u64(42));
        let start = Utc::now();
        for i in 0..1000 {
            s.observe(i as f64, 0.0, start + Duration::milliseconds(i * 100));
        }
        // Roughly 10% of 1000 observed ticks; generous bounds for seed drift
        assert!(s.len() > 50, "kept {}", s.len());
        assert!(s.len() < 200, "kept {}", s.len());
    }
}
