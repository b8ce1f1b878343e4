//! Dequantization kernels for Q4_K (256 elements/block) and MXFP4 (32
//! elements/block) weight formats. The crate consumes their raw bytes
//! as opaque input; format parsing beyond block size is out of scope.

use bytemuck::{Pod, Zeroable};

use crate::device::DeviceCapabilities;
use crate::dtype::Dtype;
use crate::error::DispatchError;

use super::validate_positive_u32;

pub const Q4K_OPERATION: &str = "dequant_q4k";
pub const MXFP4_OPERATION: &str = "dequant_mxfp4";

pub const Q4K_BLOCK_ELEMENTS: u32 = 256;
pub const MXFP4_BLOCK_ELEMENTS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Q4KVariant {
    Subgroup,
    SubgroupVec4,
    SubgroupF16Out,
    SubgroupF16OutVec4,
    Shared,
    SharedVec4,
    SharedF16Out,
    SharedF16OutVec4,
}

impl Q4KVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            Q4KVariant::Subgroup => "subgroup",
            Q4KVariant::SubgroupVec4 => "subgroup_vec4",
            Q4KVariant::SubgroupF16Out => "subgroup_f16out",
            Q4KVariant::SubgroupF16OutVec4 => "subgroup_f16out_vec4",
            Q4KVariant::Shared => "shared",
            Q4KVariant::SharedVec4 => "shared_vec4",
            Q4KVariant::SharedF16Out => "shared_f16out",
            Q4KVariant::SharedF16OutVec4 => "shared_f16out_vec4",
        }
    }

    /// One workgroup per block for every variant except the
    /// non-vectorized subgroup path, which instead dispatches
    /// `ceil(numBlocks * 256 / 64)` workgroups.
    pub fn is_per_block_dispatch(self) -> bool {
        !matches!(self, Q4KVariant::Subgroup | Q4KVariant::SubgroupF16Out)
    }
}

pub fn select_q4k_variant(
    output_dtype: Dtype,
    use_vec4: bool,
    caps: &DeviceCapabilities,
) -> Q4KVariant {
    let f16_out = output_dtype.is_half() && caps.has_f16;
    if caps.has_subgroups {
        match (f16_out, use_vec4) {
            (true, true) => Q4KVariant::SubgroupF16OutVec4,
            (true, false) => Q4KVariant::SubgroupF16Out,
            (false, true) => Q4KVariant::SubgroupVec4,
            (false, false) => Q4KVariant::Subgroup,
        }
    } else {
        match (f16_out, use_vec4) {
            (true, true) => Q4KVariant::SharedF16OutVec4,
            (true, false) => Q4KVariant::SharedF16Out,
            (false, true) => Q4KVariant::SharedVec4,
            (false, false) => Q4KVariant::Shared,
        }
    }
}

pub fn validate_q4k(num_blocks: u32) -> Result<(), DispatchError> {
    validate_positive_u32(Q4K_OPERATION, "numBlocks", num_blocks)
}

pub fn q4k_dispatch_count(variant: Q4KVariant, num_blocks: u32, workgroup_size_x: u32) -> u32 {
    if variant.is_per_block_dispatch() {
        num_blocks
    } else {
        (num_blocks as u64 * Q4K_BLOCK_ELEMENTS as u64).div_ceil(workgroup_size_x as u64) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mxfp4Variant {
    Full,
    FullVec4,
    Expert,
}

impl Mxfp4Variant {
    pub const fn as_str(self) -> &'static str {
        match self {
            Mxfp4Variant::Full => "mxfp4",
            Mxfp4Variant::FullVec4 => "mxfp4_vec4",
            Mxfp4Variant::Expert => "mxfp4_expert",
        }
    }
}

/// `mxfp4`/`mxfp4_vec4` dequantize the full tensor; `mxfp4_expert`
/// extracts a single expert's weights from a packed `[num_experts,
/// out_dim, num_groups, 16]` input.
pub fn select_mxfp4_variant(single_expert: bool, use_vec4: bool) -> Mxfp4Variant {
    if single_expert {
        Mxfp4Variant::Expert
    } else if use_vec4 {
        Mxfp4Variant::FullVec4
    } else {
        Mxfp4Variant::Full
    }
}

pub fn validate_mxfp4(num_blocks: u32) -> Result<(), DispatchError> {
    validate_positive_u32(MXFP4_OPERATION, "numBlocks", num_blocks)
}

/// Identifies which expert's weights to extract from a packed
/// `[num_experts, out_dim, num_groups, 16]` input for `mxfp4_expert`.
#[derive(Debug, Clone, Copy)]
pub struct Mxfp4ExpertSelect {
    pub expert_index: u32,
    pub num_experts: u32,
    pub out_dim: u32,
    pub num_groups: u32,
}

pub fn validate_mxfp4_expert(select: &Mxfp4ExpertSelect) -> Result<(), DispatchError> {
    validate_positive_u32(MXFP4_OPERATION, "numExperts", select.num_experts)?;
    validate_positive_u32(MXFP4_OPERATION, "outDim", select.out_dim)?;
    validate_positive_u32(MXFP4_OPERATION, "numGroups", select.num_groups)?;
    if select.expert_index >= select.num_experts {
        return Err(DispatchError::InvalidArgument {
            operator: MXFP4_OPERATION,
            argument: "expertIndex",
            value: select.expert_index.to_string(),
            constraint: "must be < numExperts",
        });
    }
    Ok(())
}

/// Little-endian packed uniform struct for both the full-tensor and
/// per-expert dequant entry points; `expert_index`/`out_dim`/
/// `num_groups` are unused (left `0`) by the full-tensor variants.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Mxfp4Uniforms {
    pub num_blocks: u32,
    pub expert_index: u32,
    pub out_dim: u32,
    pub num_groups: u32,
}

pub fn mxfp4_uniforms(num_blocks: u32, expert: Option<&Mxfp4ExpertSelect>) -> Mxfp4Uniforms {
    match expert {
        Some(e) => Mxfp4Uniforms {
            num_blocks,
            expert_index: e.expert_index,
            out_dim: e.out_dim,
            num_groups: e.num_groups,
        },
        None => Mxfp4Uniforms {
            num_blocks,
            expert_index: 0,
            out_dim: 0,
            num_groups: 0,
        },
    }
}

/// One workgroup per block, for all three variants: `mxfp4`/`mxfp4_vec4`
/// process the full `num_blocks` of the tensor, `mxfp4_expert` takes
/// `num_blocks = outDim * numGroups` scoped to the single expert being
/// extracted.
pub fn mxfp4_dispatch_count(num_blocks: u32) -> u32 {
    num_blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(subgroups: bool, f16: bool) -> DeviceCapabilities {
        DeviceCapabilities {
            has_f16: f16,
            has_subgroups: subgroups,
            has_subgroups_f16: subgroups && f16,
            has_timestamp_query: false,
        }
    }

    #[test]
    fn subgroup_preferred_when_available() {
        assert_eq!(
            select_q4k_variant(Dtype::F32, false, &caps(true, false)),
            Q4KVariant::Subgroup
        );
        assert_eq!(
            select_q4k_variant(Dtype::F32, false, &caps(false, false)),
            Q4KVariant::Shared
        );
    }

    #[test]
    fn f16_output_suffix_requires_f16_support() {
        assert_eq!(
            select_q4k_variant(Dtype::F16, true, &caps(true, true)),
            Q4KVariant::SubgroupF16OutVec4
        );
        // Without f16 support, falls back to the non-f16out variant
        // even though f16 output was requested.
        assert_eq!(
            select_q4k_variant(Dtype::F16, true, &caps(true, false)),
            Q4KVariant::SubgroupVec4
        );
    }

    #[test]
    fn dispatch_is_one_workgroup_per_block_except_plain_subgroup() {
        assert_eq!(q4k_dispatch_count(Q4KVariant::Shared, 10, 64), 10);
        assert_eq!(q4k_dispatch_count(Q4KVariant::SharedVec4, 10, 64), 10);
        // 10 blocks * 256 elements / 64 = 40
        assert_eq!(q4k_dispatch_count(Q4KVariant::Subgroup, 10, 64), 40);
    }

    #[test]
    fn mxfp4_expert_takes_priority_over_vec4() {
        assert_eq!(select_mxfp4_variant(true, true), Mxfp4Variant::Expert);
        assert_eq!(select_mxfp4_variant(false, true), Mxfp4Variant::FullVec4);
        assert_eq!(select_mxfp4_variant(false, false), Mxfp4Variant::Full);
    }

    #[test]
    fn mxfp4_expert_index_out_of_range_is_rejected() {
        let select = Mxfp4ExpertSelect {
            expert_index: 8,
            num_experts: 8,
            out_dim: 4096,
            num_groups: 16,
        };
        assert!(validate_mxfp4_expert(&select).is_err());
        let select = Mxfp4ExpertSelect {
            expert_index: 7,
            ..select
        };
        assert!(validate_mxfp4_expert(&select).is_ok());
    }

    #[test]
    fn mxfp4_uniforms_leave_expert_fields_zeroed_for_full_tensor() {
        let uniforms = mxfp4_uniforms(100, None);
        assert_eq!(uniforms.num_blocks, 100);
        assert_eq!(uniforms.expert_index, 0);
        assert_eq!(uniforms.out_dim, 0);
        assert_eq!(uniforms.num_groups, 0);

        let select = Mxfp4ExpertSelect {
            expert_index: 3,
            num_experts: 8,
            out_dim: 4096,
            num_groups: 16,
        };
        let uniforms = mxfp4_uniforms(4096 * 16, Some(&select));
        assert_eq!(uniforms.expert_index, 3);
        assert_eq!(uniforms.out_dim, 4096);
        assert_eq!(uniforms.num_groups, 16);
    }

    #[test]
    fn mxfp4_dispatch_is_one_workgroup_per_block() {
        assert_eq!(mxfp4_dispatch_count(10), 10);
    }
}
