//! Matrix multiply: `C[M,N] = alpha * A[M,K] @ B[K,N]` (B optionally
//! transposed).

use bytemuck::{Pod, Zeroable};

use crate::device::DeviceCapabilities;
use crate::dtype::Dtype;
use crate::error::DispatchError;

use super::{validate_offset, validate_positive_u32, wrap_workgroup_count};

pub const OPERATION: &str = "matmul";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatmulVariant {
    F32,
    F16,
    F16Vec4,
    F16wF32aNaive,
    F16wF32aTiled,
}

impl MatmulVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            MatmulVariant::F32 => "f32",
            MatmulVariant::F16 => "f16",
            MatmulVariant::F16Vec4 => "f16_vec4",
            MatmulVariant::F16wF32aNaive => "f16w_f32a_naive",
            MatmulVariant::F16wF32aTiled => "f16w_f32a",
        }
    }

    /// The element type the variant writes to its output buffer.
    pub const fn output_dtype(self) -> Dtype {
        match self {
            MatmulVariant::F32 => Dtype::F32,
            MatmulVariant::F16 | MatmulVariant::F16Vec4 => Dtype::F16,
            MatmulVariant::F16wF32aNaive | MatmulVariant::F16wF32aTiled => Dtype::F32,
        }
    }
}

/// Inputs to variant selection, independent of any GPU resource.
pub struct MatmulSelectInput {
    pub a_dtype: Dtype,
    pub b_dtype: Dtype,
    pub output_dtype: Dtype,
    pub m: u32,
    pub prefer_f16: bool,
    pub use_vec4: bool,
}

/// Deterministic variant selection.
pub fn select_variant(input: &MatmulSelectInput, caps: &DeviceCapabilities) -> MatmulVariant {
    let both_half = input.a_dtype.is_half() && input.b_dtype.is_half();
    if input.output_dtype.is_half() && both_half && caps.has_f16 && input.prefer_f16 {
        return if input.use_vec4 {
            MatmulVariant::F16Vec4
        } else {
            MatmulVariant::F16
        };
    }

    let mixed_precision = !input.output_dtype.is_half()
        && input.b_dtype.is_half()
        && !input.a_dtype.is_half()
        && caps.has_f16;
    if mixed_precision {
        return if input.m == 1 {
            MatmulVariant::F16wF32aNaive
        } else {
            MatmulVariant::F16wF32aTiled
        };
    }

    MatmulVariant::F32
}

/// Little-endian packed uniform struct: `u32 M, u32 N, u32 K, f32
/// alpha, u32 transpose_b` (20 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MatmulUniforms {
    pub m: u32,
    pub n: u32,
    pub k: u32,
    pub alpha: f32,
    pub transpose_b: u32,
}

pub struct MatmulArgs {
    pub m: u32,
    pub n: u32,
    pub k: u32,
    pub alpha: f32,
    pub transpose_b: bool,
    pub a_offset: u64,
    pub b_offset: u64,
    pub c_offset: u64,
}

pub fn validate(args: &MatmulArgs) -> Result<(), DispatchError> {
    validate_positive_u32(OPERATION, "M", args.m)?;
    validate_positive_u32(OPERATION, "N", args.n)?;
    validate_positive_u32(OPERATION, "K", args.k)?;
    validate_offset(OPERATION, "aOffset", args.a_offset)?;
    validate_offset(OPERATION, "bOffset", args.b_offset)?;
    validate_offset(OPERATION, "cOffset", args.c_offset)?;
    Ok(())
}

pub fn uniforms(args: &MatmulArgs) -> MatmulUniforms {
    MatmulUniforms {
        m: args.m,
        n: args.n,
        k: args.k,
        alpha: args.alpha,
        transpose_b: args.transpose_b as u32,
    }
}

/// Dispatch workgroup count for the selected variant. Naive variants
/// dispatch 1-D over `N` (thread index = output column); tiled
/// variants dispatch 2-D over `(M, N)`.
pub fn dispatch_count(
    variant: MatmulVariant,
    args: &MatmulArgs,
    workgroup_size: (u32, u32, u32),
) -> (u32, u32, u32) {
    match variant {
        MatmulVariant::F16wF32aNaive => {
            let x = (args.n as u64).div_ceil(workgroup_size.0 as u64);
            (x as u32, 1, 1)
        }
        _ => {
            let x = (args.m as u64).div_ceil(workgroup_size.0 as u64);
            let y = (args.n as u64).div_ceil(workgroup_size.1 as u64);
            (x as u32, y as u32, 1)
        }
    }
}

/// Wraps the computed dispatch into a device-limit-respecting 2-D
/// count per each axis independently.
pub fn wrapped_dispatch_count(
    variant: MatmulVariant,
    args: &MatmulArgs,
    workgroup_size: (u32, u32, u32),
    max_per_dim: u32,
) -> (u32, u32) {
    let (x, y, _z) = dispatch_count(variant, args, workgroup_size);
    if variant == MatmulVariant::F16wF32aNaive {
        wrap_workgroup_count(x as u64, max_per_dim)
    } else {
        (x.min(max_per_dim), y.min(max_per_dim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(has_f16: bool) -> DeviceCapabilities {
        DeviceCapabilities {
            has_f16,
            has_subgroups: false,
            has_subgroups_f16: false,
            has_timestamp_query: false,
        }
    }

    #[test]
    fn decode_with_half_weights_selects_naive_mixed_precision() {
        // A f32 1x4096, B f16 4096x4096: mixed dtypes rule out the pure-f16 variant.
        let input = MatmulSelectInput {
            a_dtype: Dtype::F32,
            b_dtype: Dtype::F16,
            output_dtype: Dtype::F32,
            m: 1,
            prefer_f16: true,
            use_vec4: false,
        };
        let variant = select_variant(&input, &caps(true));
        assert_eq!(variant, MatmulVariant::F16wF32aNaive);

        let args = MatmulArgs {
            m: 1,
            n: 4096,
            k: 4096,
            alpha: 1.0,
            transpose_b: false,
            a_offset: 0,
            b_offset: 0,
            c_offset: 0,
        };
        let (x, y, _) = dispatch_count(variant, &args, (256, 1, 1));
        assert_eq!((x, y), (16, 1));
    }

    #[test]
    fn prefill_with_half_weights_selects_tiled_mixed_precision() {
        let input = MatmulSelectInput {
            a_dtype: Dtype::F32,
            b_dtype: Dtype::F16,
            output_dtype: Dtype::F32,
            m: 128,
            prefer_f16: true,
            use_vec4: false,
        };
        assert_eq!(
            select_variant(&input, &caps(true)),
            MatmulVariant::F16wF32aTiled
        );
    }

    #[test]
    fn both_half_with_half_output_selects_f16() {
        let input = MatmulSelectInput {
            a_dtype: Dtype::F16,
            b_dtype: Dtype::F16,
            output_dtype: Dtype::F16,
            m: 4,
            prefer_f16: true,
            use_vec4: false,
        };
        assert_eq!(select_variant(&input, &caps(true)), MatmulVariant::F16);
        let input_vec4 = MatmulSelectInput {
            use_vec4: true,
            ..input
        };
        assert_eq!(
            select_variant(&input_vec4, &caps(true)),
            MatmulVariant::F16Vec4
        );
    }

    #[test]
    fn falls_back_to_f32_without_f16_support() {
        let input = MatmulSelectInput {
            a_dtype: Dtype::F32,
            b_dtype: Dtype::F16,
            output_dtype: Dtype::F32,
            m: 1,
            prefer_f16: true,
            use_vec4: false,
        };
        assert_eq!(select_variant(&input, &caps(false)), MatmulVariant::F32);
    }

    #[test]
    fn tiled_dispatch_is_2d_over_m_and_n() {
        let args = MatmulArgs {
            m: 100,
            n: 200,
            k: 64,
            alpha: 1.0,
            transpose_b: false,
            a_offset: 0,
            b_offset: 0,
            c_offset: 0,
        };
        let (x, y, _) = dispatch_count(MatmulVariant::F32, &args, (16, 16, 1));
        assert_eq!((x, y), (7, 13));
    }

    #[test]
    fn offsets_must_be_256_aligned() {
        let args = MatmulArgs {
            m: 1,
            n: 1,
            k: 1,
            alpha: 1.0,
            transpose_b: false,
            a_offset: 1,
            b_offset: 0,
            c_offset: 0,
        };
        assert!(validate(&args).is_err());
    }

    #[test]
    fn uniform_struct_is_20_bytes() {
        assert_eq!(std::mem::size_of::<MatmulUniforms>(), 20);
    }
}
