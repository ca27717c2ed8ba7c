//! Counter, histogram and timing aggregation.

use std::collections::BTreeMap;
use std::time::Duration;

/// Aggregated metrics for one typecheck run.
///
/// Each worker owns a `Counters` value and records into it without
/// synchronization; the driver merges them when the run is over. Sorted maps
/// keep the submission walk deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    counters: BTreeMap<String, u64>,
    by_category: BTreeMap<String, BTreeMap<String, u64>>,
    histograms: BTreeMap<String, BTreeMap<u32, u64>>,
    timings: BTreeMap<String, Vec<u64>>,
}

impl Counters {
    /// Create an empty set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a plain counter by one.
    pub fn inc(&mut self, counter: &str) {
        self.add(counter, 1);
    }

    /// Add to a plain counter.
    pub fn add(&mut self, counter: &str, delta: u64) {
        *self.counters.entry(counter.to_string()).or_default() += delta;
    }

    /// Add to one key of a categorized counter.
    pub fn category_add(&mut self, category: &str, key: &str, delta: u64) {
        *self
            .by_category
            .entry(category.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default() += delta;
    }

    /// Count one sample into a histogram bucket.
    pub fn histogram_inc(&mut self, histogram: &str, bucket: u32) {
        *self
            .histograms
            .entry(histogram.to_string())
            .or_default()
            .entry(bucket)
            .or_default() += 1;
    }

    /// Record one timing sample.
    pub fn timing(&mut self, name: &str, elapsed: Duration) {
        self.timing_ns(name, elapsed.as_nanos().try_into().unwrap_or(u64::MAX));
    }

    /// Record one timing sample in nanoseconds.
    pub fn timing_ns(&mut self, name: &str, ns: u64) {
        self.timings.entry(name.to_string()).or_default().push(ns);
    }

    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: Counters) {
        for (counter, value) in other.counters {
            *self.counters.entry(counter).or_default() += value;
        }
        for (category, entries) in other.by_category {
            let into = self.by_category.entry(category).or_default();
            for (key, value) in entries {
                *into.entry(key).or_default() += value;
            }
        }
        for (histogram, buckets) in other.histograms {
            let into = self.histograms.entry(histogram).or_default();
            for (bucket, count) in buckets {
                *into.entry(bucket).or_default() += count;
            }
        }
        for (name, mut samples) in other.timings {
            self.timings.entry(name).or_default().append(&mut samples);
        }
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.by_category.is_empty()
            && self.histograms.is_empty()
            && self.timings.is_empty()
    }

    /// Plain counters, sorted by name.
    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    /// Categorized counters, sorted by category then key.
    pub fn by_category(&self) -> &BTreeMap<String, BTreeMap<String, u64>> {
        &self.by_category
    }

    /// Histograms, sorted by name then bucket.
    pub fn histograms(&self) -> &BTreeMap<String, BTreeMap<u32, u64>> {
        &self.histograms
    }

    /// Timing samples in nanoseconds, in recording order per name.
    pub fn timings(&self) -> &BTreeMap<String, Vec<u64>> {
        &self.timings
    }
}
