//! Kernel Auto-Tuner.
//!
//! Benchmarks candidate workgroup sizes (and, for matmul, variant
//! choice) per device and persists the winner keyed by a device
//! signature, so a second run on the same GPU skips straight to the
//! cached result. Cache storage is pluggable via a small trait with
//! string keys and values, so any key-value store suffices.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::DeviceLimits;
use crate::error::DispatchResult;

/// Result of tuning one kernel for one input shape on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneResult {
    pub optimal_workgroup_size: [u32; 3],
    pub optimal_tile_size: u32,
    /// GFLOPS for benchmarked kernels (matmul); `0.0` for kernels tuned
    /// only by heuristic. Downstream code must not treat a `0.0`
    /// throughput as a real measurement.
    pub throughput: f32,
    /// Milliseconds per dispatch for benchmarked kernels; `0.0` for
    /// heuristic-only results, same caveat as `throughput`.
    pub time_ms: f32,
    pub device_info_signature: String,
}

/// A 1-D workgroup-size candidate, clamped by device limits.
pub fn candidates_1d(limits: &DeviceLimits) -> Vec<u32> {
    [64u32, 128, 256, 512]
        .into_iter()
        .filter(|&size| size <= limits.max_compute_invocations_per_workgroup)
        .filter(|&size| size <= limits.max_compute_workgroup_size_x)
        .collect()
}

/// A 2-D `(x, y)` workgroup-size candidate grid for matmul, filtered so
/// `x * y` never exceeds `max_compute_invocations_per_workgroup`.
pub fn candidates_2d(limits: &DeviceLimits) -> Vec<(u32, u32)> {
    let sizes = [8u32, 16, 32];
    let mut out = Vec::new();
    for &x in &sizes {
        for &y in &sizes {
            if x * y <= limits.max_compute_invocations_per_workgroup
                && x <= limits.max_compute_workgroup_size_x
                && y <= limits.max_compute_workgroup_size_y
            {
                out.push((x, y));
            }
        }
    }
    out
}

/// `TuneResult` for kernels the tuner does not benchmark directly
/// (anything but matmul): a sensible default workgroup size with the
/// sentinel throughput/time fields set to `0.0`.
pub fn heuristic_result(workgroup_size: [u32; 3], device_signature: &str) -> TuneResult {
    TuneResult {
        optimal_workgroup_size: workgroup_size,
        optimal_tile_size: workgroup_size[0],
        throughput: 0.0,
        time_ms: 0.0,
        device_info_signature: device_signature.to_string(),
    }
}

/// GFLOPS for an `M x K x N` matmul completed in `seconds`.
pub fn matmul_gflops(m: u32, k: u32, n: u32, seconds: f64) -> f32 {
    if seconds <= 0.0 {
        return 0.0;
    }
    let flops = 2.0 * m as f64 * k as f64 * n as f64;
    (flops / seconds / 1.0e9) as f32
}

/// `kernelName_JSON(inputSizes)` — stable across calls with the same
/// shape, which is all a cache key needs to be.
pub fn cache_key(kernel_name: &str, input_sizes: &[u32]) -> String {
    format!("{kernel_name}_{}", serde_json::to_string(input_sizes).unwrap_or_default())
}

/// Persists and retrieves tuning results keyed by
/// `(device_signature, cache_key)`. Implementations decide storage
/// medium; [`JsonFileCacheStore`] is the default file-backed one.
pub trait TuneCacheStore: Send + Sync {
    fn get(&self, device_signature: &str, key: &str) -> Option<TuneResult>;
    fn set(&mut self, device_signature: &str, key: &str, result: TuneResult);
}

/// In-memory store, useful for tests and for callers who only want
/// tuning to persist within a process.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: HashMap<(String, String), TuneResult>,
}

impl TuneCacheStore for MemoryCacheStore {
    fn get(&self, device_signature: &str, key: &str) -> Option<TuneResult> {
        self.entries
            .get(&(device_signature.to_string(), key.to_string()))
            .cloned()
    }

    fn set(&mut self, device_signature: &str, key: &str, result: TuneResult) {
        self.entries
            .insert((device_signature.to_string(), key.to_string()), result);
    }
}

/// JSON file on disk, one file per device signature, each holding a
/// `{cache_key -> TuneResult}` map. Default cache directory is
/// `std::env::temp_dir().join("doppler-kernels")`.
pub struct JsonFileCacheStore {
    dir: PathBuf,
    loaded: HashMap<String, HashMap<String, TuneResult>>,
}

impl JsonFileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: HashMap::new(),
        }
    }

    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("doppler-kernels")
    }

    fn file_path(&self, device_signature: &str) -> PathBuf {
        self.dir.join(format!("{device_signature}.json"))
    }

    fn ensure_loaded(&mut self, device_signature: &str) {
        if self.loaded.contains_key(device_signature) {
            return;
        }
        let map = Self::read_file(&self.file_path(device_signature)).unwrap_or_default();
        self.loaded.insert(device_signature.to_string(), map);
    }

    fn read_file(path: &Path) -> DispatchResult<HashMap<String, TuneResult>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::DispatchError::Transient(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| crate::error::DispatchError::Transient(e.to_string()))
    }

    fn flush(&self, device_signature: &str) {
        let Some(map) = self.loaded.get(device_signature) else {
            return;
        };
        if std::fs::create_dir_all(&self.dir).is_err() {
            log::warn!("tuner cache: failed to create cache directory {:?}", self.dir);
            return;
        }
        match serde_json::to_string_pretty(map) {
            Ok(text) => {
                if let Err(e) = std::fs::write(self.file_path(device_signature), text) {
                    log::warn!("tuner cache: failed to write cache file: {e}");
                }
            }
            Err(e) => log::warn!("tuner cache: failed to serialize cache: {e}"),
        }
    }
}

impl TuneCacheStore for JsonFileCacheStore {
    fn get(&self, device_signature: &str, key: &str) -> Option<TuneResult> {
        self.loaded
            .get(device_signature)
            .and_then(|map| map.get(key))
            .cloned()
    }

    fn set(&mut self, device_signature: &str, key: &str, result: TuneResult) {
        self.ensure_loaded(device_signature);
        self.loaded
            .entry(device_signature.to_string())
            .or_default()
            .insert(key.to_string(), result);
        self.flush(device_signature);
    }
}

/// Glues a [`TuneCacheStore`] to the candidate-generation helpers above.
/// Actual matmul benchmarking requires a live `wgpu::Device` to build and
/// time specialized pipelines; that loop is left to callers holding a
/// [`crate::dispatch::KernelDispatcher`], which can run
/// [`candidates_2d`] through repeated timed dispatches via
/// [`crate::profiler::GpuProfiler`] and feed the fastest result to
/// [`KernelAutoTuner::record`].
pub struct KernelAutoTuner<S: TuneCacheStore> {
    store: S,
    device_signature: String,
}

impl<S: TuneCacheStore> KernelAutoTuner<S> {
    pub fn new(store: S, device_signature: String) -> Self {
        Self {
            store,
            device_signature,
        }
    }

    /// Returns a cached result unless `force_retune` is set, in which
    /// case the cache is bypassed (but not cleared — `record` below
    /// will overwrite the stale entry with whatever is measured next).
    pub fn lookup(&self, key: &str, force_retune: bool) -> Option<TuneResult> {
        if force_retune {
            return None;
        }
        self.store.get(&self.device_signature, key)
    }

    pub fn record(&mut self, key: &str, result: TuneResult) {
        self.store.set(&self.device_signature, key, result);
    }

    pub fn device_signature(&self) -> &str {
        &self.device_signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DeviceLimits {
        DeviceLimits {
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroups_per_dimension: 65535,
            max_storage_buffer_binding_size: 1 << 30,
            max_buffer_size: 1 << 31,
            max_compute_workgroup_storage_size: 16384,
        }
    }

    #[test]
    fn candidates_1d_excludes_sizes_above_limits() {
        let cands = candidates_1d(&limits());
        assert_eq!(cands, vec![64, 128, 256]);
    }

    #[test]
    fn candidates_2d_filters_by_total_invocations() {
        let cands = candidates_2d(&limits());
        assert!(cands.iter().all(|&(x, y)| x * y <= 256));
        assert!(cands.contains(&(16, 16)));
        assert!(!cands.contains(&(32, 32))); // 1024 > 256
    }

    #[test]
    fn heuristic_result_uses_sentinel_throughput_and_time() {
        let r = heuristic_result([256, 1, 1], "sig");
        assert_eq!(r.throughput, 0.0);
        assert_eq!(r.time_ms, 0.0);
    }

    #[test]
    fn cache_key_is_stable_for_same_shape() {
        let a = cache_key("matmul", &[128, 4096, 4096]);
        let b = cache_key("matmul", &[128, 4096, 4096]);
        assert_eq!(a, b);
        let c = cache_key("matmul", &[1, 4096, 4096]);
        assert_ne!(a, c);
    }

    #[test]
    fn cache_hit_is_idempotent() {
        let mut tuner = KernelAutoTuner::new(MemoryCacheStore::default(), "sig".to_string());
        let key = cache_key("matmul", &[128, 4096, 4096]);
        let result = TuneResult {
            optimal_workgroup_size: [16, 16, 1],
            optimal_tile_size: 16,
            throughput: 42.0,
            time_ms: 1.5,
            device_info_signature: "sig".to_string(),
        };
        tuner.record(&key, result.clone());
        assert_eq!(tuner.lookup(&key, false), Some(result.clone()));
        assert_eq!(tuner.lookup(&key, false), Some(result));
    }

    #[test]
    fn force_retune_bypasses_the_cache() {
        let mut tuner = KernelAutoTuner::new(MemoryCacheStore::default(), "sig".to_string());
        let key = cache_key("matmul", &[1, 4096, 4096]);
        tuner.record(
            &key,
            TuneResult {
                optimal_workgroup_size: [256, 1, 1],
                optimal_tile_size: 256,
                throughput: 10.0,
                time_ms: 2.0,
                device_info_signature: "sig".to_string(),
            },
        );
        assert!(tuner.lookup(&key, true).is_none());
        assert!(tuner.lookup(&key, false).is_some());
    }

    #[test]
    fn matmul_gflops_is_zero_for_nonpositive_duration() {
        assert_eq!(matmul_gflops(128, 4096, 4096, 0.0), 0.0);
        assert!(matmul_gflops(128, 4096, 4096, 0.01) > 0.0);
    }
}
