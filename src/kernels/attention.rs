//! Multi-head attention (prefill and decode).

use bytemuck::{Pod, Zeroable};

use crate::device::{DeviceCapabilities, DeviceLimits};
use crate::dtype::Dtype;
use crate::error::DispatchError;

use super::validate_positive_u32;

pub const OPERATION: &str = "attention";

/// Required shared memory for the large tile; downstream shaders
/// assume this exact value.
pub const TILED_LARGE_SHARED_BYTES: u32 = 49_152;
const TILED_LARGE_MAX_HEAD_DIM: u32 = 64;
const TILED_SMALL_MAX_HEAD_DIM: u32 = 256;
const TILED_SMALL_BLOCK: u32 = 32;
const TILED_LARGE_BLOCK: u32 = 64;

/// Required shared-memory bytes for the 32-wide small tile, as a
/// function of head dimension (one float per lane per cached row).
pub fn required_small_shared_bytes(head_dim: u32) -> u32 {
    TILED_SMALL_BLOCK * head_dim * 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionTier {
    TiledLarge,
    TiledSmall,
    Streaming,
}

impl AttentionTier {
    pub fn variant_name(self, f16_kv: bool) -> &'static str {
        match (self, f16_kv) {
            (AttentionTier::TiledLarge, false) => "tiled_large",
            (AttentionTier::TiledLarge, true) => "tiled_large_f16kv",
            (AttentionTier::TiledSmall, false) => "tiled_small",
            (AttentionTier::TiledSmall, true) => "tiled_small_f16kv",
            (AttentionTier::Streaming, false) => "streaming",
            (AttentionTier::Streaming, true) => "streaming_f16kv",
        }
    }
}

pub struct AttentionArgs {
    pub num_heads: u32,
    pub num_kv_heads: u32,
    pub head_dim: u32,
    pub seq_len: u32,
    pub kv_len: u32,
    pub scale: f32,
    pub causal: bool,
    pub start_pos: u32,
    pub kv_dtype: Dtype,
}

pub fn validate(args: &AttentionArgs) -> Result<(), DispatchError> {
    validate_positive_u32(OPERATION, "numHeads", args.num_heads)?;
    validate_positive_u32(OPERATION, "numKVHeads", args.num_kv_heads)?;
    validate_positive_u32(OPERATION, "headDim", args.head_dim)?;
    validate_positive_u32(OPERATION, "seqLen", args.seq_len)?;
    validate_positive_u32(OPERATION, "kvLen", args.kv_len)?;
    Ok(())
}

/// Pre-dispatch validation specific to attention: reject if `seqLen *
/// numHeads` exceeds the workgroup-per-dimension limit, or if the Q
/// buffer's implied byte size exceeds the max-storage-binding-size.
pub fn pre_dispatch_validate(
    args: &AttentionArgs,
    limits: &DeviceLimits,
) -> Result<(), DispatchError> {
    let seq_heads = args.seq_len as u64 * args.num_heads as u64;
    if seq_heads > limits.max_compute_workgroups_per_dimension as u64 {
        return Err(DispatchError::LimitExceeded {
            operator: OPERATION,
            detail: format!(
                "seqLen * numHeads = {seq_heads} exceeds max_compute_workgroups_per_dimension ({})",
                limits.max_compute_workgroups_per_dimension
            ),
            hint: "reduce sequence length or use streaming attention",
        });
    }

    let q_bytes =
        args.seq_len as u64 * args.num_heads as u64 * args.head_dim as u64 * 4;
    if q_bytes > limits.max_storage_buffer_binding_size as u64 {
        return Err(DispatchError::LimitExceeded {
            operator: OPERATION,
            detail: format!(
                "seqLen * numHeads * headDim * 4 = {q_bytes} bytes exceeds max_storage_buffer_binding_size ({})",
                limits.max_storage_buffer_binding_size
            ),
            hint: "reduce sequence length or use streaming attention",
        });
    }

    Ok(())
}

/// Deterministic tier selection. Warns (does not fail) when the
/// required shared-memory tile exceeds the device's shared-memory
/// limit, and when prefill is force-routed to `streaming`.
pub fn select_tier(args: &AttentionArgs, limits: &DeviceLimits) -> AttentionTier {
    let shared = limits.max_compute_workgroup_storage_size;
    let decode = args.seq_len == 1;

    if args.head_dim <= TILED_LARGE_MAX_HEAD_DIM && shared >= TILED_LARGE_SHARED_BYTES {
        return AttentionTier::TiledLarge;
    }
    if args.head_dim <= TILED_SMALL_MAX_HEAD_DIM
        && shared >= required_small_shared_bytes(args.head_dim)
    {
        return AttentionTier::TiledSmall;
    }
    if decode {
        return AttentionTier::Streaming;
    }
    log::warn!(
        "attention: no tiled tier fits (headDim={}, shared={shared}B) on a prefill \
         (seqLen={}); forcing streaming tier, which will be slow",
        args.head_dim,
        args.seq_len
    );
    AttentionTier::Streaming
}

pub fn f16_kv_selected(args: &AttentionArgs, caps: &DeviceCapabilities) -> bool {
    args.kv_dtype.is_half() && caps.has_f16
}

/// 32-byte uniform struct: numHeads, numKVHeads, headDim, kvLen,
/// seqLen (u32), scale (f32), causal, startPos (u32).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AttentionUniforms {
    pub num_heads: u32,
    pub num_kv_heads: u32,
    pub head_dim: u32,
    pub kv_len: u32,
    pub seq_len: u32,
    pub scale: f32,
    pub causal: u32,
    pub start_pos: u32,
}

pub fn uniforms(args: &AttentionArgs) -> AttentionUniforms {
    AttentionUniforms {
        num_heads: args.num_heads,
        num_kv_heads: args.num_kv_heads,
        head_dim: args.head_dim,
        kv_len: args.kv_len,
        seq_len: args.seq_len,
        scale: args.scale,
        causal: args.causal as u32,
        start_pos: args.start_pos,
    }
}

/// Dispatch workgroup count (x dimension) for the selected tier.
pub fn dispatch_count(tier: AttentionTier, args: &AttentionArgs) -> u32 {
    match tier {
        AttentionTier::Streaming => args.seq_len * args.num_heads,
        AttentionTier::TiledLarge => {
            args.seq_len.div_ceil(TILED_LARGE_BLOCK) * args.num_heads
        }
        AttentionTier::TiledSmall => {
            args.seq_len.div_ceil(TILED_SMALL_BLOCK) * args.num_heads
        }
    }
}

pub fn default_scale(head_dim: u32) -> f32 {
    1.0 / (head_dim as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(shared: u32) -> DeviceLimits {
        DeviceLimits {
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroups_per_dimension: 65535,
            max_storage_buffer_binding_size: 1 << 30,
            max_buffer_size: 1 << 31,
            max_compute_workgroup_storage_size: shared,
        }
    }

    #[test]
    fn prefill_on_small_shared_memory_device_selects_tiled_small() {
        // 32 heads, head_dim 96, 128-token prefill on a 32KiB shared-memory device.
        let args = AttentionArgs {
            num_heads: 32,
            num_kv_heads: 8,
            head_dim: 96,
            seq_len: 128,
            kv_len: 128,
            scale: default_scale(96),
            causal: true,
            start_pos: 0,
            kv_dtype: Dtype::F32,
        };
        let limits = limits(32 * 1024);
        assert!(pre_dispatch_validate(&args, &limits).is_ok());
        let tier = select_tier(&args, &limits);
        assert_eq!(tier, AttentionTier::TiledSmall);
        assert_eq!(dispatch_count(tier, &args), 128);
    }

    #[test]
    fn decode_on_tiny_device_selects_streaming_f16kv() {
        // Single-token decode, head_dim 128, on a device too small for the tiled tiers.
        let args = AttentionArgs {
            num_heads: 16,
            num_kv_heads: 16,
            head_dim: 128,
            seq_len: 1,
            kv_len: 64,
            scale: default_scale(128),
            causal: true,
            start_pos: 63,
            kv_dtype: Dtype::F16,
        };
        let limits = limits(8 * 1024);
        let tier = select_tier(&args, &limits);
        assert_eq!(tier, AttentionTier::Streaming);
        let caps = DeviceCapabilities {
            has_f16: true,
            has_subgroups: false,
            has_subgroups_f16: false,
            has_timestamp_query: false,
        };
        assert!(f16_kv_selected(&args, &caps));
        assert_eq!(tier.variant_name(true), "streaming_f16kv");
        assert_eq!(dispatch_count(tier, &args), 16);
    }

    #[test]
    fn oversized_seq_times_heads_is_rejected_before_dispatch() {
        let args = AttentionArgs {
            num_heads: 1000,
            num_kv_heads: 1000,
            head_dim: 64,
            seq_len: 1000,
            kv_len: 1000,
            scale: 1.0,
            causal: false,
            start_pos: 0,
            kv_dtype: Dtype::F32,
        };
        let mut limits = limits(64 * 1024);
        limits.max_compute_workgroups_per_dimension = 65535;
        assert!(pre_dispatch_validate(&args, &limits).is_err());
    }

    #[test]
    fn head_dim_le_64_with_ample_shared_memory_selects_tiled_large() {
        let args = AttentionArgs {
            num_heads: 8,
            num_kv_heads: 8,
            head_dim: 64,
            seq_len: 512,
            kv_len: 512,
            scale: default_scale(64),
            causal: true,
            start_pos: 0,
            kv_dtype: Dtype::F32,
        };
        let limits = limits(TILED_LARGE_SHARED_BYTES);
        assert_eq!(select_tier(&args, &limits), AttentionTier::TiledLarge);
    }
}
