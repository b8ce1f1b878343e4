//! Mixture-of-experts routing: top-k selection, fused softmax+top-k,
//! the two-phase MoE gather, and scatter-add.

use bytemuck::{Pod, Zeroable};

use crate::error::DispatchError;

use super::validate_positive_u32;

pub const TOPK_OPERATION: &str = "topk";
pub const SOFTMAX_TOPK_OPERATION: &str = "softmax_topk";
pub const MOE_GATHER_OPERATION: &str = "moe_gather";
pub const MOE_SCATTER_ADD_OPERATION: &str = "moe_scatter_add";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKVariant {
    Small,
    Default,
}

impl TopKVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            TopKVariant::Small => "topk_2_small",
            TopKVariant::Default => "default",
        }
    }
}

/// `topk_2_small` when `k == 2 && numExperts <= 8`, else `default`.
pub fn select_topk_variant(k: u32, num_experts: u32) -> TopKVariant {
    if k == 2 && num_experts <= 8 {
        TopKVariant::Small
    } else {
        TopKVariant::Default
    }
}

pub fn validate_topk(num_tokens: u32, num_experts: u32, k: u32) -> Result<(), DispatchError> {
    validate_positive_u32(TOPK_OPERATION, "numTokens", num_tokens)?;
    validate_positive_u32(TOPK_OPERATION, "numExperts", num_experts)?;
    validate_positive_u32(TOPK_OPERATION, "k", k)?;
    if k > num_experts {
        return Err(DispatchError::InvalidArgument {
            operator: TOPK_OPERATION,
            argument: "k",
            value: k.to_string(),
            constraint: "must be <= numExperts",
        });
    }
    Ok(())
}

/// One workgroup per token-block at the declared workgroup size.
pub fn topk_dispatch_count(num_tokens: u32, workgroup_size_x: u32) -> u32 {
    (num_tokens as u64).div_ceil(workgroup_size_x as u64) as u32
}

/// `indices[tokens,k]` and `weights[tokens,k]`. When `normalize` is
/// set, each row's weights are re-scaled to sum to 1 by the shader;
/// this helper computes the expected host-side result for testing.
pub fn normalize_row(weights: &mut [f32]) {
    let sum: f32 = weights.iter().sum();
    if sum > 0.0 {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
}

/// Phase 1: atomically builds `tokenCounts[numExperts]` and a
/// `tokenMap[numExperts * maxPerExpert * 2]` pairing `(origToken,
/// k-slot)` per expert slot.
pub fn count_and_map_dispatch_count(num_tokens: u32, k: u32, workgroup_size_x: u32) -> u32 {
    (num_tokens as u64 * k as u64).div_ceil(workgroup_size_x as u64) as u32
}

pub fn validate_moe_gather(
    num_tokens: u32,
    num_experts: u32,
    top_k: u32,
    hidden_size: u32,
    max_per_expert: u32,
) -> Result<(), DispatchError> {
    validate_positive_u32(MOE_GATHER_OPERATION, "numTokens", num_tokens)?;
    validate_positive_u32(MOE_GATHER_OPERATION, "numExperts", num_experts)?;
    validate_positive_u32(MOE_GATHER_OPERATION, "topK", top_k)?;
    validate_positive_u32(MOE_GATHER_OPERATION, "hiddenSize", hidden_size)?;
    validate_positive_u32(MOE_GATHER_OPERATION, "maxPerExpert", max_per_expert)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoeGatherVariant {
    GatherTokens,
    GatherTokensVec4,
}

impl MoeGatherVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            MoeGatherVariant::GatherTokens => "gather_tokens",
            MoeGatherVariant::GatherTokensVec4 => "gather_tokens_vec4",
        }
    }
}

pub fn select_gather_variant(hidden_size: u32) -> MoeGatherVariant {
    if hidden_size % 4 == 0 {
        MoeGatherVariant::GatherTokensVec4
    } else {
        MoeGatherVariant::GatherTokens
    }
}

/// Phase 2 dispatch over `numExperts * maxPerExpert * hiddenSize`
/// elements (vectorized by 4 when applicable).
pub fn gather_tokens_dispatch_count(
    num_experts: u32,
    max_per_expert: u32,
    hidden_size: u32,
    variant: MoeGatherVariant,
    workgroup_size_x: u32,
) -> u32 {
    let elements = num_experts as u64 * max_per_expert as u64 * hidden_size as u64;
    let elements = match variant {
        MoeGatherVariant::GatherTokensVec4 => elements / 4,
        MoeGatherVariant::GatherTokens => elements,
    };
    elements.div_ceil(workgroup_size_x as u64) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterAddVariant {
    Default,
    Vec4,
    Accumulate,
    Dynamic,
}

impl ScatterAddVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            ScatterAddVariant::Default => "default",
            ScatterAddVariant::Vec4 => "vec4",
            ScatterAddVariant::Accumulate => "accumulate",
            ScatterAddVariant::Dynamic => "dynamic",
        }
    }
}

/// `vec4` when vectorizable and not accumulating; `accumulate` when
/// atomically adding into an existing output; `dynamic` when a
/// `tokenOffsets` table replaces the implicit `numExperts *
/// maxPerExpert` stride; otherwise `default`.
pub fn select_scatter_add_variant(
    hidden_size: u32,
    accumulate: bool,
    dynamic_offsets: bool,
) -> ScatterAddVariant {
    if dynamic_offsets {
        ScatterAddVariant::Dynamic
    } else if accumulate {
        ScatterAddVariant::Accumulate
    } else if hidden_size % 4 == 0 {
        ScatterAddVariant::Vec4
    } else {
        ScatterAddVariant::Default
    }
}

/// Dispatch count over `numExperts * maxPerExpert * hiddenSize`
/// elements, vectorized by 4 only for the `vec4` variant; `accumulate`
/// and `dynamic` use the same per-element (non-vectorized) count as
/// `default`.
pub fn scatter_add_dispatch_count(
    num_experts: u32,
    max_per_expert: u32,
    hidden_size: u32,
    variant: ScatterAddVariant,
    workgroup_size_x: u32,
) -> u32 {
    let elements = num_experts as u64 * max_per_expert as u64 * hidden_size as u64;
    let elements = match variant {
        ScatterAddVariant::Vec4 => elements / 4,
        ScatterAddVariant::Default | ScatterAddVariant::Accumulate | ScatterAddVariant::Dynamic => {
            elements
        }
    };
    elements.div_ceil(workgroup_size_x as u64) as u32
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MoeGatherUniforms {
    pub num_tokens: u32,
    pub num_experts: u32,
    pub top_k: u32,
    pub hidden_size: u32,
    pub max_per_expert: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topk_routing_end_to_end() {
        // numTokens=7, numExperts=8, topK=2: small-k routing picks the Small variant.
        assert_eq!(select_topk_variant(2, 8), TopKVariant::Small);
        assert_eq!(topk_dispatch_count(7, 256), 1);

        let mut weights = vec![3.0, 1.0];
        normalize_row(&mut weights);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn moe_gather_dispatch_counts_for_a_typical_moe_layer() {
        // numTokens=16, hiddenSize=512, numExperts=32, topK=4, maxPerExpert=64.
        assert_eq!(count_and_map_dispatch_count(16, 4, 256), 1);
        let variant = select_gather_variant(512);
        assert_eq!(variant, MoeGatherVariant::GatherTokensVec4);
        let count = gather_tokens_dispatch_count(32, 64, 512, variant, 64);
        // 32*64*512/4 = 262144; /64 = 4096
        assert_eq!(count, 4096);
    }

    #[test]
    fn scatter_add_variant_priority_dynamic_over_accumulate_over_vec4() {
        assert_eq!(
            select_scatter_add_variant(512, true, true),
            ScatterAddVariant::Dynamic
        );
        assert_eq!(
            select_scatter_add_variant(512, true, false),
            ScatterAddVariant::Accumulate
        );
        assert_eq!(
            select_scatter_add_variant(512, false, false),
            ScatterAddVariant::Vec4
        );
        assert_eq!(
            select_scatter_add_variant(513, false, false),
            ScatterAddVariant::Default
        );
    }

    #[test]
    fn k_greater_than_num_experts_is_rejected() {
        assert!(validate_topk(4, 8, 2).is_ok());
        assert!(validate_topk(4, 2, 8).is_err());
    }

    #[test]
    fn moe_gather_validation_rejects_zero_arguments() {
        assert!(validate_moe_gather(16, 32, 4, 512, 64).is_ok());
        assert!(validate_moe_gather(0, 32, 4, 512, 64).is_err());
        assert!(validate_moe_gather(16, 32, 4, 0, 64).is_err());
    }

    #[test]
    fn scatter_add_dispatch_count_vectorizes_only_for_vec4() {
        // 32*64*512 = 1048576 elements.
        let count = scatter_add_dispatch_count(32, 64, 512, ScatterAddVariant::Default, 256);
        assert_eq!(count, 1048576 / 256);
        let vec4_count = scatter_add_dispatch_count(32, 64, 512, ScatterAddVariant::Vec4, 64);
        assert_eq!(vec4_count, (1048576 / 4) / 64);
        let accumulate_count =
            scatter_add_dispatch_count(32, 64, 512, ScatterAddVariant::Accumulate, 256);
        assert_eq!(accumulate_count, count);
    }
}
