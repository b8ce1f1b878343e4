//! Shader source loading.
//!
//! Shader text itself is out of this crate's scope — it is consumed as
//! opaque text addressed by filename. This module only specifies how
//! that text is fetched, so the cache above it can stay source-agnostic.

use crate::error::DispatchError;

/// A source of shader text, addressed by filename. Implementations may
/// read from disk, an embedded archive, or a network fetch; the
/// Pipeline Cache only requires idempotent-on-success behavior.
pub trait ShaderSource: Send + Sync {
    /// Fetches the source text for `filename`. Implementations should
    /// not cache internally — that's the Pipeline Cache's job.
    fn load(&self, filename: &str) -> Result<String, DispatchError>;
}

/// Loads shader text from `{base_path}/{filename}` on the local
/// filesystem, relative to a fixed kernel base path.
pub struct FsShaderSource {
    base_path: std::path::PathBuf,
}

impl FsShaderSource {
    pub fn new(base_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl ShaderSource for FsShaderSource {
    fn load(&self, filename: &str) -> Result<String, DispatchError> {
        let path = self.base_path.join(filename);
        std::fs::read_to_string(&path)
            .map_err(|e| DispatchError::ShaderLoad(filename.to_string(), e.to_string()))
    }
}

/// An in-memory source, useful for tests and for embedding shaders at
/// build time via `include_str!`.
pub struct StaticShaderSource {
    files: std::collections::HashMap<String, String>,
}

impl StaticShaderSource {
    pub fn new() -> Self {
        Self {
            files: std::collections::HashMap::new(),
        }
    }

    pub fn with(mut self, filename: impl Into<String>, source: impl Into<String>) -> Self {
        self.files.insert(filename.into(), source.into());
        self
    }
}

impl Default for StaticShaderSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderSource for StaticShaderSource {
    fn load(&self, filename: &str) -> Result<String, DispatchError> {
        self.files
            .get(filename)
            .cloned()
            .ok_or_else(|| DispatchError::ShaderLoad(filename.to_string(), "not found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_source_round_trips() {
        let src = StaticShaderSource::new().with("matmul_f32.wgsl", "// wgsl source");
        assert_eq!(src.load("matmul_f32.wgsl").unwrap(), "// wgsl source");
    }

    #[test]
    fn static_source_missing_file_errors() {
        let src = StaticShaderSource::new();
        assert!(src.load("missing.wgsl").is_err());
    }

    #[test]
    fn fs_source_missing_file_errors() {
        let src = FsShaderSource::new("/nonexistent/doppler-kernels-test-path");
        assert!(src.load("matmul_f32.wgsl").is_err());
    }
}
