//! Engine instrumentation surfaced alongside a calculation's result
//! (spec.md §4.9, §7).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculationMetrics {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub events_processed: usize,
    pub segments_processed: usize,
    pub retroactive_inserts: usize,
}

impl CalculationMetrics {
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Accumulates metrics over one calculation; handed to `engine::run` and
/// consumed into a [`CalculationMetrics`] snapshot at the end.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    metrics: CalculationMetrics,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&mut self) {
        self.metrics.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.metrics.cache_misses += 1;
    }

    pub fn record_events(&mut self, count: usize) {
        self.metrics.events_processed += count;
    }

    pub fn record_segment(&mut self) {
        self.metrics.segments_processed += 1;
    }

    pub fn record_retroactive_insert(&mut self) {
        self.metrics.retroactive_inserts += 1;
    }

    #[must_use]
    pub fn finish(self) -> CalculationMetrics {
        self.metrics
    }
}
