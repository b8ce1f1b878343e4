//! Shader & Pipeline Cache.
//!
//! Loads shader source by filename (idempotent, cached), compiles to
//! modules, constructs compute pipelines with automatic bind-group
//! layouts, and caches by `(operation, variant)`. Generalized from a
//! name-keyed render-pipeline cache to an `(operation, variant)`-keyed
//! compute-pipeline cache whose valid keys are a static table instead
//! of ad hoc string registration.

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::{DeviceCapabilities, RequiredFeature};
use crate::error::{DispatchError, DispatchResult};
use crate::shader::ShaderSource;

/// Immutable per-`(operation, variant)` configuration. One row per
/// shader entry point.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub operation: &'static str,
    pub variant: &'static str,
    pub shader_file: &'static str,
    pub entry_point: &'static str,
    pub workgroup_size: (u32, u32, u32),
    pub required_features: &'static [RequiredFeature],
}

/// Cache key. Includes the variant (and, transitively, the entry
/// point via the config table) because a single shader file commonly
/// defines several entry points with different bind layouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub operation: &'static str,
    pub variant: &'static str,
}

impl PipelineKey {
    pub fn new(operation: &'static str, variant: &'static str) -> Self {
        Self { operation, variant }
    }
}

pub struct PipelineCache {
    device: Arc<wgpu::Device>,
    source: Arc<dyn ShaderSource>,
    configs: HashMap<PipelineKey, KernelConfig>,
    shader_sources: HashMap<&'static str, String>,
    shader_modules: HashMap<&'static str, Arc<wgpu::ShaderModule>>,
    pipelines: HashMap<PipelineKey, Arc<wgpu::ComputePipeline>>,
}

impl PipelineCache {
    pub fn new(
        device: Arc<wgpu::Device>,
        source: Arc<dyn ShaderSource>,
        configs: &'static [KernelConfig],
    ) -> Self {
        let configs = configs
            .iter()
            .map(|c| (PipelineKey::new(c.operation, c.variant), *c))
            .collect();
        Self {
            device,
            source,
            configs,
            shader_sources: HashMap::new(),
            shader_modules: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    /// Idempotent: first call fetches and caches the source text;
    /// later calls return the cached copy.
    pub fn load_shader(&mut self, filename: &'static str) -> DispatchResult<&str> {
        if !self.shader_sources.contains_key(filename) {
            let text = self.source.load(filename)?;
            self.shader_sources.insert(filename, text);
        }
        Ok(self.shader_sources.get(filename).expect("just inserted"))
    }

    fn config_for(&self, key: &PipelineKey) -> DispatchResult<KernelConfig> {
        self.configs
            .get(key)
            .copied()
            .ok_or_else(|| DispatchError::UnknownVariant {
                operation: key.operation,
                variant: key.variant.to_string(),
            })
    }

    /// Idempotent per key. Verifies required features, loads + compiles
    /// the shader, constructs a compute pipeline with an automatic
    /// bind-group layout, and caches it. Subsequent calls for the same
    /// key return the cached pipeline object (identity-stable across
    /// repeated calls).
    pub fn create_pipeline(
        &mut self,
        operation: &'static str,
        variant: &'static str,
        caps: &DeviceCapabilities,
    ) -> DispatchResult<Arc<wgpu::ComputePipeline>> {
        let key = PipelineKey::new(operation, variant);
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(Arc::clone(pipeline));
        }

        let config = self.config_for(&key)?;
        for feature in config.required_features {
            if !feature.is_satisfied(caps) {
                return Err(DispatchError::MissingFeature {
                    operator: operation,
                    variant,
                    feature: feature.name(),
                });
            }
        }

        if !self.shader_modules.contains_key(config.shader_file) {
            let source = self.load_shader(config.shader_file)?.to_string();
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(config.shader_file),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            self.shader_modules
                .insert(config.shader_file, Arc::new(module));
        }
        let module = self
            .shader_modules
            .get(config.shader_file)
            .expect("just inserted");

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(config.entry_point),
                layout: None,
                module,
                entry_point: Some(config.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        let pipeline = Arc::new(pipeline);
        self.pipelines.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Eagerly builds every pipeline whose feature requirements are
    /// met. Per-variant failures are logged and skipped — losing one
    /// variant in a warmup batch must not abort startup.
    pub fn prewarm_all(&mut self, caps: &DeviceCapabilities) {
        let keys: Vec<(&'static str, &'static str)> = self
            .configs
            .keys()
            .map(|k| (k.operation, k.variant))
            .collect();
        for (operation, variant) in keys {
            if let Err(e) = self.create_pipeline(operation, variant, caps) {
                log::warn!("prewarm skipped {operation}:{variant}: {e}");
            }
        }
    }

    /// Drops both the shader source cache and the pipeline cache.
    pub fn clear_cache(&mut self) {
        self.shader_sources.clear();
        self.shader_modules.clear();
        self.pipelines.clear();
    }

    pub fn is_pipeline_cached(&self, operation: &'static str, variant: &'static str) -> bool {
        self.pipelines
            .contains_key(&PipelineKey::new(operation, variant))
    }

    /// Human-facing dump of cache contents.
    pub fn describe(&self) -> String {
        let mut out = String::from("=== PIPELINE CACHE STATUS ===\n");
        out.push_str(&format!("registered variants: {}\n", self.configs.len()));
        out.push_str(&format!("compiled pipelines:  {}\n", self.pipelines.len()));
        out.push_str(&format!("loaded shaders:      {}\n", self.shader_sources.len()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::StaticShaderSource;

    static TEST_CONFIGS: &[KernelConfig] = &[
        KernelConfig {
            operation: "matmul",
            variant: "f32",
            shader_file: "matmul.wgsl",
            entry_point: "matmul_f32",
            workgroup_size: (16, 16, 1),
            required_features: &[],
        },
        KernelConfig {
            operation: "matmul",
            variant: "f16",
            shader_file: "matmul.wgsl",
            entry_point: "matmul_f16",
            workgroup_size: (16, 16, 1),
            required_features: &[RequiredFeature::ShaderF16],
        },
    ];

    #[test]
    fn unknown_variant_is_an_error() {
        // Exercised without a device: config lookup fails before any
        // wgpu call is made.
        let configs: HashMap<PipelineKey, KernelConfig> = TEST_CONFIGS
            .iter()
            .map(|c| (PipelineKey::new(c.operation, c.variant), *c))
            .collect();
        assert!(!configs.contains_key(&PipelineKey::new("matmul", "bogus")));
    }

    #[test]
    fn missing_feature_is_detected_before_device_calls() {
        let caps = DeviceCapabilities {
            has_f16: false,
            has_subgroups: false,
            has_subgroups_f16: false,
            has_timestamp_query: false,
        };
        let config = TEST_CONFIGS[1];
        let unmet: Vec<_> = config
            .required_features
            .iter()
            .filter(|f| !f.is_satisfied(&caps))
            .collect();
        assert_eq!(unmet.len(), 1);
    }

    #[test]
    fn static_shader_source_is_used_as_configured() {
        let src = StaticShaderSource::new().with("matmul.wgsl", "// source");
        assert_eq!(src.load("matmul.wgsl").unwrap(), "// source");
    }
}
