//! Device Capability Registry.
//!
//! Holds the resolved device handle, queried limits, and derived
//! feature flags. Resolved once at construction via read-only
//! accessors (`device()`, `queue()`, `limits()`, `capabilities()`);
//! no mutation after init.

use std::sync::Arc;

/// Device-reported limits relevant to compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLimits {
    pub max_compute_workgroup_size_x: u32,
    pub max_compute_workgroup_size_y: u32,
    pub max_compute_workgroup_size_z: u32,
    pub max_compute_invocations_per_workgroup: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub max_storage_buffer_binding_size: u32,
    pub max_buffer_size: u64,
    pub max_compute_workgroup_storage_size: u32,
}

impl From<&wgpu::Limits> for DeviceLimits {
    fn from(limits: &wgpu::Limits) -> Self {
        Self {
            max_compute_workgroup_size_x: limits.max_compute_workgroup_size_x,
            max_compute_workgroup_size_y: limits.max_compute_workgroup_size_y,
            max_compute_workgroup_size_z: limits.max_compute_workgroup_size_z,
            max_compute_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
            max_buffer_size: limits.max_buffer_size,
            max_compute_workgroup_storage_size: limits.max_compute_workgroup_storage_size,
        }
    }
}

/// Adapter identity, used solely to form the tuner's cache key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterInfo {
    pub vendor: String,
    pub architecture: String,
    pub device: String,
}

impl AdapterInfo {
    /// `vendor_architecture_device` with non-alphanumerics replaced by
    /// `_`, forming the device signature used to key tuner persistence.
    pub fn signature(&self) -> String {
        let raw = format!("{}_{}_{}", self.vendor, self.architecture, self.device);
        raw.chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl From<&wgpu::AdapterInfo> for AdapterInfo {
    fn from(info: &wgpu::AdapterInfo) -> Self {
        Self {
            vendor: format!("{:x}", info.vendor),
            architecture: info.driver.clone(),
            device: info.name.clone(),
        }
    }
}

/// Booleans derived from the adapter's feature set at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub has_f16: bool,
    pub has_subgroups: bool,
    pub has_subgroups_f16: bool,
    pub has_timestamp_query: bool,
}

impl DeviceCapabilities {
    fn from_features(features: wgpu::Features) -> Self {
        Self {
            has_f16: features.contains(wgpu::Features::SHADER_F16),
            has_subgroups: features.contains(wgpu::Features::SUBGROUP),
            has_subgroups_f16: features.contains(wgpu::Features::SUBGROUP)
                && features.contains(wgpu::Features::SHADER_F16),
            has_timestamp_query: features.contains(wgpu::Features::TIMESTAMP_QUERY),
        }
    }
}

/// The names `wgpu::Features` this crate may require per variant,
/// matched against [`DeviceCapabilities`] by the Pipeline Cache before
/// any dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredFeature {
    ShaderF16,
    Subgroups,
    SubgroupsF16,
}

impl RequiredFeature {
    pub const fn name(self) -> &'static str {
        match self {
            RequiredFeature::ShaderF16 => "shader-f16",
            RequiredFeature::Subgroups => "subgroups",
            RequiredFeature::SubgroupsF16 => "subgroups-f16",
        }
    }

    pub fn is_satisfied(self, caps: &DeviceCapabilities) -> bool {
        match self {
            RequiredFeature::ShaderF16 => caps.has_f16,
            RequiredFeature::Subgroups => caps.has_subgroups,
            RequiredFeature::SubgroupsF16 => caps.has_subgroups_f16,
        }
    }
}

/// Process-wide (or instance-local, if the caller holds one per
/// dispatcher) registry of the resolved device, its limits, and its
/// capabilities. No mutation after construction.
pub struct DeviceCapabilityRegistry {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    limits: DeviceLimits,
    capabilities: DeviceCapabilities,
    adapter_info: AdapterInfo,
}

impl DeviceCapabilityRegistry {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        adapter_info: &wgpu::AdapterInfo,
    ) -> Self {
        let limits = DeviceLimits::from(&device.limits());
        let capabilities = DeviceCapabilities::from_features(device.features());
        Self {
            device,
            queue,
            limits,
            capabilities,
            adapter_info: AdapterInfo::from(adapter_info),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    /// Requests a headless (surface-less) adapter and device, enabling
    /// whichever of `SHADER_F16` / `SUBGROUP` / `TIMESTAMP_QUERY` the
    /// adapter reports, and builds a registry from the result. No
    /// surface negotiation — a compute-only crate has no use for one.
    pub async fn init_headless() -> Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| format!("failed to request adapter: {e}"))?;

        let wanted = wgpu::Features::SHADER_F16
            | wgpu::Features::SUBGROUP
            | wgpu::Features::TIMESTAMP_QUERY;
        let required_features = adapter.features() & wanted;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("doppler-kernels device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| format!("failed to request device: {e}"))?;

        let adapter_info = adapter.get_info();
        Ok(Self::new(Arc::new(device), Arc::new(queue), &adapter_info))
    }

    /// Blocking wrapper around [`Self::init_headless`], for callers
    /// outside an async context.
    pub fn init_headless_blocking() -> Result<Self, String> {
        pollster::block_on(Self::init_headless())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_replaces_non_alphanumerics() {
        let info = AdapterInfo {
            vendor: "NVIDIA Corp.".into(),
            architecture: "Ada Lovelace".into(),
            device: "RTX 4090".into(),
        };
        let sig = info.signature();
        assert!(sig.chars().all(|c| c.is_alphanumeric() || c == '_'));
        assert!(sig.contains("NVIDIA"));
        assert!(sig.contains("RTX"));
    }

    #[test]
    fn required_feature_names_match_wgpu_feature_strings() {
        assert_eq!(RequiredFeature::ShaderF16.name(), "shader-f16");
        assert_eq!(RequiredFeature::Subgroups.name(), "subgroups");
        assert_eq!(RequiredFeature::SubgroupsF16.name(), "subgroups-f16");
    }

    #[test]
    fn required_feature_satisfaction() {
        let caps = DeviceCapabilities {
            has_f16: true,
            has_subgroups: false,
            has_subgroups_f16: false,
            has_timestamp_query: true,
        };
        assert!(RequiredFeature::ShaderF16.is_satisfied(&caps));
        assert!(!RequiredFeature::Subgroups.is_satisfied(&caps));
        assert!(!RequiredFeature::SubgroupsF16.is_satisfied(&caps));
    }
}
