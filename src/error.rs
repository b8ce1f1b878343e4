//! Error types for the kernel dispatch engine.
//!
//! The core never catches its own errors; callers see one of these
//! variants propagate all the way up via `?`. The sole intentional
//! swallower is [`crate::pipeline::PipelineCache::prewarm_all`], which
//! logs and continues past per-variant failures.

/// Errors surfaced by the dispatch engine, pipeline cache, profiler and
/// auto-tuner.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A shape, offset, or size argument failed validation.
    #[error("{operator}: {argument} = {value}, {constraint}")]
    InvalidArgument {
        operator: &'static str,
        argument: &'static str,
        value: String,
        constraint: &'static str,
    },

    /// A variant requires a device feature that is not present.
    #[error("{operator}:{variant} requires feature {feature} which the device does not support")]
    MissingFeature {
        operator: &'static str,
        variant: &'static str,
        feature: &'static str,
    },

    /// Shader compile/link failure.
    #[error("failed to compile shader '{file}' (entry point '{entry_point}'): {source}")]
    Compilation {
        file: String,
        entry_point: String,
        source: String,
    },

    /// A dispatch size, KV buffer size, or workgroup count exceeds a
    /// device limit.
    #[error("{operator}: {detail} (hint: {hint})")]
    LimitExceeded {
        operator: &'static str,
        detail: String,
        hint: &'static str,
    },

    /// Programmer error: the `(operation, variant)` pair is not in the
    /// static kernel config table.
    #[error("unknown kernel variant: {operation}:{variant}")]
    UnknownVariant {
        operation: &'static str,
        variant: String,
    },

    /// The shader source for `filename` could not be loaded.
    #[error("failed to load shader source '{0}': {1}")]
    ShaderLoad(String, String),

    /// Queue submission, buffer mapping, or readback failure. Propagated
    /// as-is, never retried inside the core.
    #[error("queue/transient error: {0}")]
    Transient(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
