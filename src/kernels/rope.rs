//! Rotary position embedding (RoPE), in-place over `[seqLen, numHeads,
//! headDim]`.

use bytemuck::{Pod, Zeroable};

use crate::error::DispatchError;

use super::validate_positive_u32;

pub const OPERATION: &str = "rope";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RopeVariant {
    Default,
    Ntk,
    Yarn,
    Qk,
    ComputeFreqs,
}

impl RopeVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            RopeVariant::Default => "default",
            RopeVariant::Ntk => "ntk",
            RopeVariant::Yarn => "yarn",
            RopeVariant::Qk => "qk",
            RopeVariant::ComputeFreqs => "compute_freqs",
        }
    }

    pub fn from_caller_option(name: &str) -> Option<Self> {
        match name {
            "default" => Some(RopeVariant::Default),
            "ntk" => Some(RopeVariant::Ntk),
            "yarn" => Some(RopeVariant::Yarn),
            "qk" => Some(RopeVariant::Qk),
            "compute_freqs" => Some(RopeVariant::ComputeFreqs),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RopeUniforms {
    pub seq_len: u32,
    pub num_heads: u32,
    pub head_dim: u32,
    pub start_pos: u32,
    pub rope_base: f32,
    pub rope_scale: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}

pub struct RopeArgs {
    pub seq_len: u32,
    pub num_heads: u32,
    pub head_dim: u32,
    pub start_pos: u32,
    pub rope_base: f32,
    pub rope_scale: f32,
}

pub fn validate(args: &RopeArgs) -> Result<(), DispatchError> {
    validate_positive_u32(OPERATION, "seqLen", args.seq_len)?;
    validate_positive_u32(OPERATION, "numHeads", args.num_heads)?;
    validate_positive_u32(OPERATION, "headDim", args.head_dim)?;
    Ok(())
}

pub fn uniforms(args: &RopeArgs) -> RopeUniforms {
    RopeUniforms {
        seq_len: args.seq_len,
        num_heads: args.num_heads,
        head_dim: args.head_dim,
        start_pos: args.start_pos,
        rope_base: args.rope_base,
        rope_scale: args.rope_scale,
        _pad0: 0,
        _pad1: 0,
    }
}

/// One thread per (token, head); dispatch over `seqLen * numHeads`
/// elements at the declared workgroup size.
pub fn dispatch_count(args: &RopeArgs, workgroup_size_x: u32) -> u32 {
    (args.seq_len as u64 * args.num_heads as u64).div_ceil(workgroup_size_x as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_struct_is_32_bytes() {
        assert_eq!(std::mem::size_of::<RopeUniforms>(), 32);
    }

    #[test]
    fn unknown_variant_option_does_not_panic() {
        assert!(RopeVariant::from_caller_option("bogus").is_none());
        assert_eq!(
            RopeVariant::from_caller_option("yarn"),
            Some(RopeVariant::Yarn)
        );
    }

    #[test]
    fn dispatch_count_covers_all_token_head_pairs() {
        let args = RopeArgs {
            seq_len: 10,
            num_heads: 3,
            head_dim: 64,
            start_pos: 0,
            rope_base: 10000.0,
            rope_scale: 1.0,
        };
        assert_eq!(dispatch_count(&args, 64), 1); // 30 elements / 64
        assert_eq!(dispatch_count(&args, 16), 2); // ceil(30/16)
    }
}
