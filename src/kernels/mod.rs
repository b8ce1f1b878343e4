//! Per-operator dispatch logic: variant selection, uniform encoding,
//! and workgroup math. Each submodule is a thin layer over the shared
//! protocol helpers in this file, following the nine-step dispatch
//! protocol shared across all operators.

pub mod activation;
pub mod attention;
pub mod config;
pub mod convert;
pub mod gather;
pub mod matmul;
pub mod norm;
pub mod quantize;
pub mod rope;
pub mod routing;

use crate::error::DispatchError;

/// Storage-binding alignment required by `wgpu`.
pub const STORAGE_BINDING_ALIGNMENT: u64 = 256;

/// Validates that a dimension argument is finite and strictly
/// positive. "Finite" is relevant for the `f32` options (`alpha`,
/// `scale`, `eps`, ...); integer shape arguments are simply checked
/// for positivity.
pub fn validate_positive_u32(
    operator: &'static str,
    argument: &'static str,
    value: u32,
) -> Result<(), DispatchError> {
    if value == 0 {
        return Err(DispatchError::InvalidArgument {
            operator,
            argument,
            value: value.to_string(),
            constraint: "must be > 0",
        });
    }
    Ok(())
}

pub fn validate_finite_f32(
    operator: &'static str,
    argument: &'static str,
    value: f32,
) -> Result<(), DispatchError> {
    if !value.is_finite() {
        return Err(DispatchError::InvalidArgument {
            operator,
            argument,
            value: value.to_string(),
            constraint: "must be finite",
        });
    }
    Ok(())
}

/// Offsets must be non-negative (enforced by the `u64` type) and a
/// multiple of the 256-byte storage-binding alignment.
pub fn validate_offset(
    operator: &'static str,
    argument: &'static str,
    offset: u64,
) -> Result<(), DispatchError> {
    if offset % STORAGE_BINDING_ALIGNMENT != 0 {
        return Err(DispatchError::InvalidArgument {
            operator,
            argument,
            value: offset.to_string(),
            constraint: "must be a multiple of 256",
        });
    }
    Ok(())
}

/// Validates that `buffer_size_bytes` is large enough to hold
/// `element_count` elements of `bytes_per_element` bytes starting at
/// `offset`, using the sizing formula `offset + ceil(element_count *
/// bytes_per_element / 4) * 4`.
pub fn validate_buffer_size(
    operator: &'static str,
    argument: &'static str,
    buffer_size_bytes: u64,
    offset: u64,
    element_count: u64,
    bytes_per_element: u64,
) -> Result<(), DispatchError> {
    let payload_bytes = element_count * bytes_per_element;
    let rounded = payload_bytes.div_ceil(4) * 4;
    let required = offset + rounded;
    if buffer_size_bytes < required {
        return Err(DispatchError::InvalidArgument {
            operator,
            argument,
            value: buffer_size_bytes.to_string(),
            constraint: "buffer too small for offset + element payload",
        });
    }
    Ok(())
}

/// Computes a 1-D or wrapped 2-D workgroup dispatch count for `n`
/// workgroups, given the device's per-dimension limit: if `n` exceeds
/// `max_per_dim`, wrap into `(min(n, max_per_dim), ceil(n / max_per_dim))`.
pub fn wrap_workgroup_count(n: u64, max_per_dim: u32) -> (u32, u32) {
    let max_per_dim = max_per_dim as u64;
    if n <= max_per_dim {
        (n as u32, 1)
    } else {
        let x = max_per_dim.min(n);
        let y = n.div_ceil(max_per_dim);
        (x as u32, y as u32)
    }
}

/// Rejects a dispatch whose workgroup count would exceed
/// `max_per_dim` in both dispatchable dimensions (i.e. even the 2-D
/// wrap can't fit — `y` itself exceeds the limit).
pub fn check_dispatch_within_limits(
    operator: &'static str,
    x: u32,
    y: u32,
    max_per_dim: u32,
) -> Result<(), DispatchError> {
    if x > max_per_dim || y > max_per_dim {
        return Err(DispatchError::LimitExceeded {
            operator,
            detail: format!(
                "dispatch ({x}, {y}) exceeds max_compute_workgroups_per_dimension ({max_per_dim})"
            ),
            hint: "reduce the problem size or split the dispatch into multiple submissions",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_stays_1d_when_within_limit() {
        assert_eq!(wrap_workgroup_count(100, 65535), (100, 1));
    }

    #[test]
    fn wrap_splits_into_2d_when_exceeding_limit() {
        let (x, y) = wrap_workgroup_count(200_000, 65535);
        assert_eq!(x, 65535);
        assert_eq!(y, 4); // ceil(200000 / 65535) = 4
        assert!((x as u64) * 1 <= 65535);
    }

    #[test]
    fn buffer_size_validation_rounds_up_to_4_bytes() {
        // 3 u8 elements at offset 256 -> payload 3 bytes -> rounds to 4
        assert!(validate_buffer_size("op", "buf", 260, 256, 3, 1).is_ok());
        assert!(validate_buffer_size("op", "buf", 259, 256, 3, 1).is_err());
    }

    #[test]
    fn offset_must_be_256_aligned() {
        assert!(validate_offset("op", "offset", 256).is_ok());
        assert!(validate_offset("op", "offset", 0).is_ok());
        assert!(validate_offset("op", "offset", 255).is_err());
        assert!(validate_offset("op", "offset", 300).is_err());
    }

    #[test]
    fn positive_u32_rejects_zero() {
        assert!(validate_positive_u32("op", "m", 1).is_ok());
        assert!(validate_positive_u32("op", "m", 0).is_err());
    }
}
