//! GPU Profiler.
//!
//! Pairs GPU timestamp queries with a CPU-clock fallback, and keeps a
//! bounded per-label ring buffer of the last 100 samples (`VecDeque`,
//! evict-oldest-on-overflow, periodic min/max recompute).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::device::DeviceCapabilityRegistry;

const MAX_SAMPLES: usize = 100;
const RECOMPUTE_EVERY: u32 = 20;
const QUERY_SET_PAIR_CAPACITY: u32 = 256;
/// A measured GPU duration outside `[0, 60s]` is treated as spurious
/// (clock wraparound, driver bug) and the sample falls back to the
/// CPU-measured duration for that label instead.
const MAX_PLAUSIBLE_GPU_SECONDS: f64 = 60.0;

#[derive(Debug, Clone, Default)]
pub struct LabelStats {
    times: VecDeque<Duration>,
    sum: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
    inserts_since_recompute: u32,
}

impl LabelStats {
    fn insert(&mut self, sample: Duration) {
        if self.times.len() >= MAX_SAMPLES {
            if let Some(evicted) = self.times.pop_front() {
                self.sum = self.sum.saturating_sub(evicted);
                self.inserts_since_recompute += 1;
            }
        }
        self.times.push_back(sample);
        self.sum += sample;

        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));

        if self.inserts_since_recompute >= RECOMPUTE_EVERY {
            self.recompute_min_max();
            self.inserts_since_recompute = 0;
        }
    }

    fn recompute_min_max(&mut self) {
        self.min = self.times.iter().min().copied();
        self.max = self.times.iter().max().copied();
    }

    pub fn count(&self) -> usize {
        self.times.len()
    }

    pub fn mean(&self) -> Duration {
        if self.times.is_empty() {
            Duration::ZERO
        } else {
            self.sum / self.times.len() as u32
        }
    }

    pub fn min(&self) -> Duration {
        self.min.unwrap_or(Duration::ZERO)
    }

    pub fn max(&self) -> Duration {
        self.max.unwrap_or(Duration::ZERO)
    }
}

enum PendingStart {
    Cpu(Instant),
    Gpu { cpu_fallback: Instant, query_index: u32 },
}

/// Captures paired GPU timestamps when the device supports them, and
/// always captures a CPU-clock fallback alongside. `resolve()` reads
/// back the query set (if any queries were written since the last
/// resolve) and folds results into per-label [`LabelStats`].
pub struct GpuProfiler {
    has_timestamp_query: bool,
    stats: HashMap<String, LabelStats>,
    pending: HashMap<String, PendingStart>,
    next_query_index: u32,
    query_overflow_resets: u32,
}

impl GpuProfiler {
    pub fn new(registry: &DeviceCapabilityRegistry) -> Self {
        Self {
            has_timestamp_query: registry.capabilities().has_timestamp_query,
            stats: HashMap::new(),
            pending: HashMap::new(),
            next_query_index: 0,
            query_overflow_resets: 0,
        }
    }

    /// Begins timing `label`. On a device without timestamp-query
    /// support, this degrades to a pure CPU `Instant`.
    pub fn begin(&mut self, label: &str) {
        let start = if self.has_timestamp_query {
            let index = self.next_query_index;
            self.next_query_index += 1;
            if self.next_query_index > QUERY_SET_PAIR_CAPACITY {
                self.next_query_index = 0;
                self.query_overflow_resets += 1;
                log::warn!(
                    "GPU profiler query set ring overflowed ({QUERY_SET_PAIR_CAPACITY} pairs); \
                     resetting to index 0 ({} resets so far)",
                    self.query_overflow_resets
                );
            }
            PendingStart::Gpu {
                cpu_fallback: Instant::now(),
                query_index: index,
            }
        } else {
            PendingStart::Cpu(Instant::now())
        };
        self.pending.insert(label.to_string(), start);
    }

    /// Ends timing `label` using the CPU clock. `end_gpu_resolved`
    /// should be used instead once an actual GPU timestamp-query
    /// readback is available; this is the path used whenever only a
    /// CPU fallback is active (either by device capability or because
    /// the GPU measurement came back spurious).
    pub fn end(&mut self, label: &str) {
        if let Some(PendingStart::Cpu(start)) = self.pending.remove(label) {
            let elapsed = start.elapsed();
            self.record(label, elapsed);
        }
    }

    /// Ends timing `label` with a GPU-measured duration (seconds,
    /// derived from resolved timestamp-query ticks). Falls back to the
    /// paired CPU duration if `gpu_seconds` is negative or implausibly
    /// large.
    pub fn end_gpu_resolved(&mut self, label: &str, gpu_seconds: f64) {
        let Some(pending) = self.pending.remove(label) else {
            return;
        };
        let cpu_fallback = match pending {
            PendingStart::Gpu { cpu_fallback, .. } => cpu_fallback,
            PendingStart::Cpu(start) => start,
        };
        let cpu_elapsed = cpu_fallback.elapsed();

        let sample = if gpu_seconds < 0.0 || gpu_seconds > MAX_PLAUSIBLE_GPU_SECONDS {
            log::warn!(
                "GPU profiler: implausible GPU duration {gpu_seconds}s for '{label}'; \
                 falling back to CPU timing"
            );
            cpu_elapsed
        } else {
            Duration::from_secs_f64(gpu_seconds)
        };
        self.record(label, sample);
    }

    fn record(&mut self, label: &str, sample: Duration) {
        self.stats.entry(label.to_string()).or_default().insert(sample);
    }

    pub fn stats(&self, label: &str) -> Option<&LabelStats> {
        self.stats.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &String> {
        self.stats.keys()
    }

    pub fn reset(&mut self) {
        self.stats.clear();
        self.pending.clear();
        self.next_query_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_past_max_samples() {
        let mut stats = LabelStats::default();
        for i in 0..150u64 {
            stats.insert(Duration::from_millis(i));
        }
        assert_eq!(stats.count(), MAX_SAMPLES);
    }

    #[test]
    fn mean_reflects_incremental_sum_after_eviction() {
        let mut stats = LabelStats::default();
        for _ in 0..120 {
            stats.insert(Duration::from_millis(10));
        }
        assert_eq!(stats.mean(), Duration::from_millis(10));
    }

    #[test]
    fn min_max_recompute_after_twenty_evictions() {
        let mut stats = LabelStats::default();
        for _ in 0..100 {
            stats.insert(Duration::from_millis(5));
        }
        stats.insert(Duration::from_millis(1));
        assert_eq!(stats.min(), Duration::from_millis(1));
        for _ in 0..19 {
            stats.insert(Duration::from_millis(5));
        }
        // Past 20 evictions since the "1ms" sample was pushed out, a
        // full recompute must have dropped the stale min.
        assert_eq!(stats.min(), Duration::from_millis(5));
    }

    #[test]
    fn end_without_begin_is_a_silent_no_op() {
        let mut stats = HashMap::<String, LabelStats>::new();
        assert!(stats.get("never-begun").is_none());
    }

    #[test]
    fn spurious_gpu_duration_guard_rejects_negative_and_overlong() {
        fn is_spurious(seconds: f64) -> bool {
            seconds < 0.0 || seconds > MAX_PLAUSIBLE_GPU_SECONDS
        }
        assert!(is_spurious(-0.001));
        assert!(is_spurious(61.0));
        assert!(!is_spurious(0.002));
    }

    #[test]
    fn query_set_pair_capacity_is_256() {
        assert_eq!(QUERY_SET_PAIR_CAPACITY, 256);
    }
}
