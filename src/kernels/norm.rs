//! RMS-norm and softmax.

use bytemuck::{Pod, Zeroable};

use crate::error::DispatchError;

use super::validate_positive_u32;

pub const RMSNORM_OPERATION: &str = "rmsnorm";
pub const SOFTMAX_OPERATION: &str = "softmax";

const RMSNORM_SMALL_THRESHOLD: u32 = 256;
const SOFTMAX_SMALL_MAX: u32 = 256;
const SOFTMAX_DEFAULT_MAX: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmsNormVariant {
    Default,
    Small,
    Residual,
}

impl RmsNormVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            RmsNormVariant::Default => "default",
            RmsNormVariant::Small => "small",
            RmsNormVariant::Residual => "residual",
        }
    }
}

/// `default` unless `hiddenSize <= 256` (`small`), or unless a residual
/// input is supplied (`residual`, which takes priority and performs an
/// in-place add then norm).
pub fn select_rmsnorm_variant(hidden_size: u32, has_residual: bool) -> RmsNormVariant {
    if has_residual {
        RmsNormVariant::Residual
    } else if hidden_size <= RMSNORM_SMALL_THRESHOLD {
        RmsNormVariant::Small
    } else {
        RmsNormVariant::Default
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RmsNormUniforms {
    pub hidden_size: u32,
    pub num_tokens: u32,
    pub eps: f32,
    pub has_residual: u32,
}

pub fn validate_rmsnorm(hidden_size: u32, num_tokens: u32) -> Result<(), DispatchError> {
    validate_positive_u32(RMSNORM_OPERATION, "hiddenSize", hidden_size)?;
    validate_positive_u32(RMSNORM_OPERATION, "numTokens", num_tokens)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftmaxVariant {
    Small,
    Default,
    Online,
}

impl SoftmaxVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            SoftmaxVariant::Small => "small",
            SoftmaxVariant::Default => "default",
            SoftmaxVariant::Online => "online",
        }
    }
}

/// `small` (<=256), `default` (257..=1024), `online` (>1024, uses the
/// numerically-stable online algorithm).
pub fn select_softmax_variant(inner_size: u32) -> SoftmaxVariant {
    if inner_size <= SOFTMAX_SMALL_MAX {
        SoftmaxVariant::Small
    } else if inner_size <= SOFTMAX_DEFAULT_MAX {
        SoftmaxVariant::Default
    } else {
        SoftmaxVariant::Online
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SoftmaxUniforms {
    pub inner_size: u32,
    pub outer_size: u32,
    pub temperature: f32,
    pub _pad: u32,
}

pub fn validate_softmax(inner_size: u32, outer_size: u32) -> Result<(), DispatchError> {
    validate_positive_u32(SOFTMAX_OPERATION, "innerSize", inner_size)?;
    validate_positive_u32(SOFTMAX_OPERATION, "outerSize", outer_size)?;
    Ok(())
}

/// One workgroup per row, for both rmsnorm and softmax.
pub fn dispatch_count_per_row(num_rows: u32) -> u32 {
    num_rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmsnorm_picks_small_at_threshold() {
        assert_eq!(
            select_rmsnorm_variant(256, false),
            RmsNormVariant::Small
        );
        assert_eq!(
            select_rmsnorm_variant(257, false),
            RmsNormVariant::Default
        );
    }

    #[test]
    fn rmsnorm_residual_takes_priority_over_small() {
        assert_eq!(
            select_rmsnorm_variant(64, true),
            RmsNormVariant::Residual
        );
    }

    #[test]
    fn softmax_picks_tiers_by_inner_size() {
        assert_eq!(select_softmax_variant(256), SoftmaxVariant::Small);
        assert_eq!(select_softmax_variant(257), SoftmaxVariant::Default);
        assert_eq!(select_softmax_variant(1024), SoftmaxVariant::Default);
        assert_eq!(select_softmax_variant(1025), SoftmaxVariant::Online);
    }

    #[test]
    fn uniform_sizes_match_spec() {
        assert_eq!(std::mem::size_of::<RmsNormUniforms>(), 16);
        assert_eq!(std::mem::size_of::<SoftmaxUniforms>(), 16);
    }
}
