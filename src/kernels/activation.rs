//! Per-element activation kernels: SiLU, GeLU, GeGLU, SwiGLU, residual
//! add, bias add.

use bytemuck::{Pod, Zeroable};

use crate::error::DispatchError;

use super::{validate_offset, validate_positive_u32};

pub const SILU_OPERATION: &str = "silu";
pub const GELU_OPERATION: &str = "gelu";
pub const GEGLU_OPERATION: &str = "geglu";
pub const SWIGLU_OPERATION: &str = "swiglu";
pub const RESIDUAL_ADD_OPERATION: &str = "residual_add";
pub const BIAS_ADD_OPERATION: &str = "bias_add";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedVariant {
    Plain,
    Gated,
}

impl GatedVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            GatedVariant::Plain => "plain",
            GatedVariant::Gated => "gated",
        }
    }
}

pub fn select_gated_variant(has_gate: bool) -> GatedVariant {
    if has_gate {
        GatedVariant::Gated
    } else {
        GatedVariant::Plain
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ElementwiseUniforms {
    pub size: u32,
    /// Preserved as a tautology (`size`) rather than `size / 2`,
    /// matching the source's `const outputElements = gate ? size :
    /// size` for strict behavioral parity. See DESIGN.md's Open
    /// Question resolution.
    pub output_elements: u32,
}

/// `size` is the element count of the (ungated) primary operand;
/// `has_gate` only selects the shader variant, it does not change the
/// reported element count (see [`ElementwiseUniforms`] doc comment).
pub fn elementwise_uniforms(size: u32, _has_gate: bool) -> ElementwiseUniforms {
    ElementwiseUniforms {
        size,
        output_elements: size,
    }
}

pub fn validate_elementwise(operator: &'static str, size: u32) -> Result<(), DispatchError> {
    validate_positive_u32(operator, "size", size)
}

pub fn validate_bias_add_offset(offset: u64) -> Result<(), DispatchError> {
    validate_offset(BIAS_ADD_OPERATION, "offset", offset)
}

pub fn dispatch_count(size: u32, workgroup_size_x: u32) -> u32 {
    (size as u64).div_ceil(workgroup_size_x as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gated_selection_follows_presence_of_gate_buffer() {
        assert_eq!(select_gated_variant(false), GatedVariant::Plain);
        assert_eq!(select_gated_variant(true), GatedVariant::Gated);
    }

    #[test]
    fn output_elements_is_a_tautology_by_design() {
        let u = elementwise_uniforms(128, true);
        assert_eq!(u.output_elements, u.size);
        let u2 = elementwise_uniforms(128, false);
        assert_eq!(u2.output_elements, u2.size);
    }

    #[test]
    fn bias_add_offset_must_be_aligned() {
        assert!(validate_bias_add_offset(256).is_ok());
        assert!(validate_bias_add_offset(4).is_err());
    }
}
