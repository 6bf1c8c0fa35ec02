//! Liquidity samples recorded during this session.
//!
//! The liquidity ratio compares now against one hour ago. Nothing is
//! persisted, so a fresh process has no real baseline for its first hour
//! and the ratio falls back to a synthetic one (see `ratios`).
//!
//! # Clock injection
//! Every method takes the timestamp explicitly.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// 5-minute polling keeps about five hours.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct LiquidityHistory {
    samples: VecDeque<(DateTime<Utc>, f64)>,
    capacity: usize,
}

impl Default for LiquidityHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LiquidityHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a positive sample. Zero and negative values are no-signal
    /// readings and would poison later baselines.
    pub fn record(&mut self, at: DateTime<Utc>, value_usd: f64) {
        if !(value_usd > 0.0) || !value_usd.is_finite() {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((at, value_usd));
    }

    /// Newest sample taken at least `window` before `now`.
    pub fn baseline_at(&self, now: DateTime<Utc>, window: Duration) -> Option<f64> {
        let cutoff = now - window;
        self.samples
            .iter()
            .rev()
            .find(|(at, _)| *at <= cutoff)
            .map(|(_, value)| *value)
    }

    /// Baseline for the standard one-hour comparison.
    pub fn hour_ago(&self, now: DateTime<Utc>) -> Option<f64> {
        self.baseline_at(now, Duration::hours(1))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
