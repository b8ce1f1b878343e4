//! doppler-kernels
//!
//! A GPU compute kernel dispatcher and auto-tuner for transformer-style
//! operators (matmul, attention, normalization, RoPE, activations, MoE
//! routing, dequantization, dtype conversion), built on `wgpu`.

pub mod buffer;
pub mod device;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod kernels;
pub mod pipeline;
pub mod profiler;
pub mod recorder;
pub mod shader;
pub mod tuner;

pub use device::{DeviceCapabilities, DeviceCapabilityRegistry, DeviceLimits};
pub use dispatch::{ConversionOutput, KernelDispatcher, StorageArg};
pub use dtype::{BufferDtypeRegistry, Dtype};
pub use error::{DispatchError, DispatchResult};
pub use pipeline::{KernelConfig, PipelineCache};
pub use profiler::GpuProfiler;
pub use recorder::CommandRecorder;
pub use shader::{FsShaderSource, ShaderSource, StaticShaderSource};
pub use tuner::{JsonFileCacheStore, KernelAutoTuner, MemoryCacheStore, TuneCacheStore, TuneResult};
