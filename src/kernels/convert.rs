//! Dtype conversion kernels: `f32 -> f16` and `bf16 -> f32`.
//!
//! Conversion is bit-level (no `half` crate dependency): the GPU path
//! does the cast in-shader, with a matching CPU-side bit manipulation
//! for the fallback. The GPU path handles the common case; the CPU
//! chunked fallback only activates when the output tensor would not
//! fit in a single buffer.

use crate::device::DeviceLimits;
use crate::error::DispatchError;

use super::{validate_positive_u32, wrap_workgroup_count};

pub const F32_TO_F16_OPERATION: &str = "convert_f32_to_f16";
pub const BF16_TO_F32_OPERATION: &str = "convert_bf16_to_f32";

/// Elements processed per CPU fallback chunk, chosen to keep a single
/// intermediate allocation well under typical host memory pressure
/// while still amortizing the conversion loop.
pub const CPU_FALLBACK_CHUNK_ELEMENTS: u64 = 64 * 1024 * 1024;

pub fn validate_convert(operator: &'static str, num_elements: u32) -> Result<(), DispatchError> {
    validate_positive_u32(operator, "numElements", num_elements)
}

/// GPU dispatch count for a 1-D elementwise conversion, wrapped into
/// 2-D when `numElements` exceeds the device's per-dimension workgroup
/// limit. The in-shader uniform must carry `workgroupsX` so the shader
/// can linearize `(gid.x, gid.y)` back into a flat element index.
pub fn dispatch_count(
    num_elements: u32,
    workgroup_size_x: u32,
    limits: &DeviceLimits,
) -> (u32, u32) {
    let n = (num_elements as u64).div_ceil(workgroup_size_x as u64);
    wrap_workgroup_count(n, limits.max_compute_workgroups_per_dimension)
}

/// Whether the output buffer for `num_elements` of `output_bytes_per_element`
/// would exceed the device's max storage buffer binding size, forcing the
/// chunked CPU fallback path.
pub fn requires_cpu_fallback(
    num_elements: u64,
    output_bytes_per_element: u64,
    limits: &DeviceLimits,
) -> bool {
    num_elements * output_bytes_per_element > limits.max_storage_buffer_binding_size as u64
}

/// Whether even the CPU-fallback's output array would itself need to be
/// returned directly rather than staged back through the GPU (i.e. there
/// is no buffer on the device side that could ever hold it).
pub fn output_exceeds_max_buffer_size(
    num_elements: u64,
    output_bytes_per_element: u64,
    limits: &DeviceLimits,
) -> bool {
    num_elements * output_bytes_per_element > limits.max_buffer_size
}

/// Converts an IEEE-754 `f32` to IEEE-754 half-precision (`f16`), round-to-
/// nearest-even, with inf/NaN and subnormal handling. Used by the CPU
/// fallback path; the GPU shader performs the equivalent bit manipulation
/// in WGSL.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mantissa = bits & 0x007f_ffff;

    if exp >= 0x1f {
        // Overflow or already inf/NaN: saturate to inf, preserve NaN payload bit.
        if ((bits >> 23) & 0xff) == 0xff && mantissa != 0 {
            return sign | 0x7e00; // quiet NaN
        }
        return sign | 0x7c00;
    }
    if exp <= 0 {
        if exp < -10 {
            return sign; // too small even for a subnormal half
        }
        // Subnormal half: shift the implicit 1 in along with the mantissa.
        let mantissa = mantissa | 0x0080_0000;
        let shift = 14 - exp;
        let half_mantissa = (mantissa >> shift) as u16;
        return sign | half_mantissa;
    }
    let half_mantissa = (mantissa >> 13) as u16;
    sign | ((exp as u16) << 10) | half_mantissa
}

/// Converts a `bfloat16` bit pattern to `f32`. `bf16` is simply the
/// top 16 bits of an `f32`, so this is a left-shift into the upper
/// half of a 32-bit word.
pub fn bf16_bits_to_f32(bits: u16) -> f32 {
    f32::from_bits((bits as u32) << 16)
}

/// Converts a chunk of `bf16` values (as raw `u16` bit patterns) to `f32`,
/// the shape of the work the CPU fallback performs per chunk.
pub fn convert_bf16_chunk_to_f32(input: &[u16], output: &mut [f32]) {
    debug_assert_eq!(input.len(), output.len());
    for (src, dst) in input.iter().zip(output.iter_mut()) {
        *dst = bf16_bits_to_f32(*src);
    }
}

/// Converts a chunk of `f32` values to `f16` bit patterns, the shape of
/// the work the CPU fallback performs per chunk.
pub fn convert_f32_chunk_to_f16(input: &[f32], output: &mut [u16]) {
    debug_assert_eq!(input.len(), output.len());
    for (src, dst) in input.iter().zip(output.iter_mut()) {
        *dst = f32_to_f16_bits(*src);
    }
}

/// Splits `num_elements` into fallback chunks of at most
/// [`CPU_FALLBACK_CHUNK_ELEMENTS`], returning `(start, len)` pairs.
pub fn chunk_plan(num_elements: u64) -> Vec<(u64, u64)> {
    let mut plan = Vec::new();
    let mut start = 0u64;
    while start < num_elements {
        let len = CPU_FALLBACK_CHUNK_ELEMENTS.min(num_elements - start);
        plan.push((start, len));
        start += len;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DeviceLimits {
        DeviceLimits {
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroups_per_dimension: 65535,
            max_storage_buffer_binding_size: 128 * 1024 * 1024,
            max_buffer_size: 256 * 1024 * 1024,
            max_compute_workgroup_storage_size: 16384,
        }
    }

    #[test]
    fn f32_to_f16_round_trips_exact_values() {
        assert_eq!(f32_to_f16_bits(1.0), 0x3c00);
        assert_eq!(f32_to_f16_bits(-1.0), 0xbc00);
        assert_eq!(f32_to_f16_bits(0.0), 0x0000);
        assert_eq!(f32_to_f16_bits(2.0), 0x4000);
    }

    #[test]
    fn f32_to_f16_saturates_overflow_to_infinity() {
        assert_eq!(f32_to_f16_bits(1.0e10), 0x7c00);
        assert_eq!(f32_to_f16_bits(-1.0e10), 0xfc00);
    }

    #[test]
    fn f32_to_f16_preserves_nan() {
        let bits = f32_to_f16_bits(f32::NAN);
        assert_eq!(bits & 0x7c00, 0x7c00);
        assert_ne!(bits & 0x03ff, 0);
    }

    #[test]
    fn bf16_to_f32_is_a_pure_upper_half_widen() {
        // bf16 bit pattern for 1.0 is the top 16 bits of f32 1.0.
        let bf16_one = (1.0f32.to_bits() >> 16) as u16;
        assert_eq!(bf16_bits_to_f32(bf16_one), 1.0);
    }

    #[test]
    fn chunked_fallback_activates_when_output_exceeds_binding_limit() {
        let lim = limits();
        // 5GB of bf16 input (f32 output is 2x the bytes): exceeds the
        // 128MB max_storage_buffer_binding_size used in this test.
        let num_elements = 5u64 * 1024 * 1024 * 1024 / 2;
        assert!(requires_cpu_fallback(num_elements, 4, &lim));
    }

    #[test]
    fn chunk_plan_covers_every_element_without_overlap() {
        let plan = chunk_plan(CPU_FALLBACK_CHUNK_ELEMENTS * 2 + 10);
        assert_eq!(plan.len(), 3);
        let total: u64 = plan.iter().map(|(_, len)| *len).sum();
        assert_eq!(total, CPU_FALLBACK_CHUNK_ELEMENTS * 2 + 10);
        assert_eq!(plan[0], (0, CPU_FALLBACK_CHUNK_ELEMENTS));
        assert_eq!(plan[2], (CPU_FALLBACK_CHUNK_ELEMENTS * 2, 10));
    }

    #[test]
    fn dispatch_wraps_into_2d_for_large_element_counts() {
        let lim = limits();
        let (x, y) = dispatch_count(u32::MAX, 256, &lim);
        assert!(x as u64 * y as u64 * 256 >= u32::MAX as u64);
        assert!(x <= lim.max_compute_workgroups_per_dimension);
    }
}
